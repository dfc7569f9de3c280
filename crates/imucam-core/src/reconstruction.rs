//! Reconstruction container exchanged with the structure-from-motion stage.
//!
//! The calibrator reads per-view timestamps, camera poses and corner/track
//! correspondences from a [`Reconstruction`], and writes the refined
//! trajectory back as new estimated views.

use crate::{CameraIntrinsics, Iso3, Pt3, Real, Vec2};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// View identifier within a [`Reconstruction`].
pub type ViewId = u32;
/// Identifier of a 3D track (calibration target point).
pub type TrackId = u32;

/// A single captured frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    /// Capture timestamp in seconds.
    pub timestamp_s: Real,
    /// Camera pose as camera-to-world transform (`world_se3_camera`).
    pub world_se3_camera: Iso3,
    /// Observed pixel positions keyed by track.
    #[serde(default)]
    pub features: BTreeMap<TrackId, Vec2>,
    /// Whether the pose is an estimate (as opposed to a placeholder).
    #[serde(default)]
    pub estimated: bool,
}

impl View {
    pub fn new(name: impl Into<String>, timestamp_s: Real) -> Self {
        Self {
            name: name.into(),
            timestamp_s,
            world_se3_camera: Iso3::identity(),
            features: BTreeMap::new(),
            estimated: false,
        }
    }

    /// Track identifiers in ascending order.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.features.keys().copied().collect()
    }

    pub fn feature(&self, track_id: TrackId) -> Option<&Vec2> {
        self.features.get(&track_id)
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }
}

/// Views, 3D tracks and the (single) camera they were captured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconstruction {
    pub camera: CameraIntrinsics,
    views: BTreeMap<ViewId, View>,
    tracks: BTreeMap<TrackId, Pt3>,
}

impl Reconstruction {
    pub fn new(camera: CameraIntrinsics) -> Self {
        Self {
            camera,
            views: BTreeMap::new(),
            tracks: BTreeMap::new(),
        }
    }

    /// Add a 3D track and return its id.
    pub fn add_track(&mut self, point: Pt3) -> TrackId {
        let id = self.tracks.keys().next_back().map_or(0, |last| last + 1);
        self.tracks.insert(id, point);
        id
    }

    /// Add an empty view and return its id.
    pub fn add_view(&mut self, name: impl Into<String>, timestamp_s: Real) -> ViewId {
        self.insert_view(View::new(name, timestamp_s))
    }

    /// Insert a fully populated view and return its id.
    pub fn insert_view(&mut self, view: View) -> ViewId {
        let id = self.views.keys().next_back().map_or(0, |last| last + 1);
        self.views.insert(id, view);
        id
    }

    /// View ids in ascending order.
    pub fn view_ids(&self) -> Vec<ViewId> {
        self.views.keys().copied().collect()
    }

    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(&id)
    }

    pub fn view_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.get_mut(&id)
    }

    pub fn views(&self) -> impl Iterator<Item = (ViewId, &View)> + '_ {
        self.views.iter().map(|(id, v)| (*id, v))
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    pub fn track(&self, id: TrackId) -> Option<&Pt3> {
        self.tracks.get(&id)
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Check that every feature references an existing track and that
    /// timestamps are finite.
    pub fn validate(&self) -> Result<()> {
        for (id, view) in &self.views {
            ensure!(
                view.timestamp_s.is_finite(),
                "view {} has non-finite timestamp",
                id
            );
            for track_id in view.features.keys() {
                ensure!(
                    self.tracks.contains_key(track_id),
                    "view {} references missing track {}",
                    id,
                    track_id
                );
            }
        }
        Ok(())
    }
}
