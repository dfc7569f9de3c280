//! Synthetic planar calibration target.

use crate::{CameraIntrinsics, Iso3, Pt3, Real, Reconstruction, TrackId, Vec2, View};

/// Generate a planar grid of 3D points (Z=0) with `nx * ny` points,
/// centred on the origin.
///
/// Points are ordered deterministically in row-major order (Y major).
pub fn grid_points_centered(nx: usize, ny: usize, spacing: Real) -> Vec<Pt3> {
    let ox = (nx.saturating_sub(1)) as Real * spacing * 0.5;
    let oy = (ny.saturating_sub(1)) as Real * spacing * 0.5;
    let mut points = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            points.push(Pt3::new(
                i as Real * spacing - ox,
                j as Real * spacing - oy,
                0.0,
            ));
        }
    }
    points
}

/// Add the target points as tracks and return their ids in input order.
pub fn add_target_tracks(recon: &mut Reconstruction, points: &[Pt3]) -> Vec<TrackId> {
    points.iter().map(|p| recon.add_track(*p)).collect()
}

/// Project target tracks into a camera with pose `world_se3_camera`.
///
/// Only points that land inside the image are kept.
pub fn observe_tracks(
    camera: &CameraIntrinsics,
    world_se3_camera: &Iso3,
    tracks: &[(TrackId, Pt3)],
) -> Vec<(TrackId, Vec2)> {
    tracks
        .iter()
        .filter_map(|(id, pw)| {
            let pc = world_se3_camera.inverse_transform_point(pw);
            camera
                .project(&pc)
                .filter(|uv| camera.contains(uv))
                .map(|uv| (*id, uv))
        })
        .collect()
}

/// Build a view from a pose and its observations.
pub fn make_view(
    name: impl Into<String>,
    timestamp_s: Real,
    world_se3_camera: Iso3,
    observations: Vec<(TrackId, Vec2)>,
) -> View {
    let mut view = View::new(name, timestamp_s);
    view.world_se3_camera = world_se3_camera;
    view.features = observations.into_iter().collect();
    view.estimated = true;
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn grid_is_centered() {
        let pts = grid_points_centered(3, 3, 0.1);
        assert_eq!(pts.len(), 9);
        let centroid = pts.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords) / 9.0;
        assert!(centroid.norm() < 1e-12);
    }

    #[test]
    fn observes_points_in_front_of_camera() {
        let camera = CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0, 640, 480);
        let mut recon = Reconstruction::new(camera);
        let pts = grid_points_centered(4, 3, 0.05);
        let ids = add_target_tracks(&mut recon, &pts);
        let tracks: Vec<_> = ids.iter().copied().zip(pts.iter().copied()).collect();

        // Camera one metre in front of the board, looking at it along +Z.
        let world_se3_camera = Iso3::from_parts(
            Translation3::new(0.0, 0.0, -1.0),
            UnitQuaternion::identity(),
        );
        let obs = observe_tracks(&camera, &world_se3_camera, &tracks);
        assert_eq!(obs.len(), pts.len());

        // Looking away: nothing visible.
        let away = Iso3::from_parts(
            Translation3::new(0.0, 0.0, 1.0),
            UnitQuaternion::identity(),
        );
        assert!(observe_tracks(&camera, &away, &tracks).is_empty());
    }
}
