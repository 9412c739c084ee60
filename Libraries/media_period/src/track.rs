use std::fmt::Debug;
use std::ops::Index;

use crate::mpd::{Format, Period};

/// Mutually exclusive formats carrying the same content at different qualities.
///
/// Equality is structural: two groups are equal when they hold the same
/// formats in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackGroup {
    formats: Vec<Format>,
}

impl TrackGroup {
    pub fn new(formats: Vec<Format>) -> Self {
        Self { formats }
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn format(&self, index: usize) -> Option<&Format> {
        self.formats.get(index)
    }

    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    pub fn index_of(&self, format: &Format) -> Option<usize> {
        self.formats.iter().position(|f| f == format)
    }
}

/// The track groups of one period version. A group's identity is its index here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TrackGroupArray {
    groups: Vec<TrackGroup>,
}

impl TrackGroupArray {
    pub fn new(groups: Vec<TrackGroup>) -> Self {
        Self { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrackGroup> {
        self.groups.get(index)
    }

    /// Index of the first group structurally equal to `group`.
    pub fn index_of(&self, group: &TrackGroup) -> Option<usize> {
        self.groups.iter().position(|g| g == group)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackGroup> {
        self.groups.iter()
    }
}

impl Index<usize> for TrackGroupArray {
    type Output = TrackGroup;

    fn index(&self, index: usize) -> &TrackGroup {
        &self.groups[index]
    }
}

impl<'a> IntoIterator for &'a TrackGroupArray {
    type Item = &'a TrackGroup;
    type IntoIter = std::slice::Iter<'a, TrackGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

/// A choice of one track group plus the policy picking among its formats.
///
/// Bandwidth estimation and adaptation live behind this trait; the period only
/// routes a selection to the adaptation set at its group's position.
pub trait TrackSelection: Send + Sync + Debug {
    /// Position of the group in the period's [`TrackGroupArray`]. Groups are
    /// identified by position, so identical adaptation sets stay distinct.
    fn track_group_index(&self) -> usize;

    fn track_group(&self) -> &TrackGroup;

    /// Index into the group of the format currently selected.
    fn selected_index(&self) -> usize;

    fn selected_format(&self) -> Option<&Format> {
        self.track_group().format(self.selected_index())
    }
}

/// A selection that always picks the same format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedTrackSelection {
    group_index: usize,
    group: TrackGroup,
    index: usize,
}

impl FixedTrackSelection {
    /// Selects format `index` of `group`, found at `group_index` in its period.
    /// Returns `None` if `index` is outside the group.
    pub fn new(group_index: usize, group: TrackGroup, index: usize) -> Option<Self> {
        (index < group.len()).then_some(Self {
            group_index,
            group,
            index,
        })
    }

    /// Selects format `index` of the group at `group_index` in `groups`.
    pub fn from_groups(groups: &TrackGroupArray, group_index: usize, index: usize) -> Option<Self> {
        Self::new(group_index, groups.get(group_index)?.clone(), index)
    }
}

impl TrackSelection for FixedTrackSelection {
    fn track_group_index(&self) -> usize {
        self.group_index
    }

    fn track_group(&self) -> &TrackGroup {
        &self.group
    }

    fn selected_index(&self) -> usize {
        self.index
    }
}

/// One track group per adaptation set, keeping the adaptation set's
/// representation order.
pub fn build_track_groups(period: &Period) -> TrackGroupArray {
    TrackGroupArray::new(
        period
            .adaptation_sets
            .iter()
            .map(|adaptation_set| {
                TrackGroup::new(
                    adaptation_set
                        .representations
                        .iter()
                        .map(|representation| representation.format.clone())
                        .collect(),
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpd::builder::ManifestBuilder;
    use crate::mpd::TrackType;

    fn period() -> Period {
        ManifestBuilder::on_demand(60_000)
            .add_adaptation_set(TrackType::Video)
            .add_representation(Format::new("v0", "video/mp4", "avc1.4D401F", 400_000).with_resolution(640, 360))
            .add_representation(Format::new("v1", "video/mp4", "avc1.4D401F", 1_200_000).with_resolution(1280, 720))
            .add_representation(Format::new("v2", "video/mp4", "avc1.640028", 4_000_000).with_resolution(1920, 1080))
            .add_adaptation_set(TrackType::Audio)
            .add_representation(Format::new("a0", "audio/mp4", "mp4a.40.2", 128_000).with_sample_rate(48_000))
            .build()
            .unwrap()
            .periods
            .remove(0)
    }

    #[test]
    fn one_group_per_adaptation_set() {
        let groups = build_track_groups(&period());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 3);
        assert_eq!(groups[1].len(), 1);
        assert_eq!(groups[0].format(2).unwrap().id, "v2");
        assert_eq!(groups[0].index_of(groups[0].format(1).unwrap()), Some(1));
    }

    #[test]
    fn building_is_deterministic() {
        let period = period();
        assert_eq!(build_track_groups(&period), build_track_groups(&period));
    }

    #[test]
    fn groups_are_found_structurally() {
        let groups = build_track_groups(&period());
        let copy = TrackGroup::new(groups[1].formats().to_vec());
        assert_eq!(groups.index_of(&copy), Some(1));
        let unknown = TrackGroup::new(vec![Format::new("x", "video/mp4", "avc1", 1)]);
        assert_eq!(groups.index_of(&unknown), None);
    }

    #[test]
    fn fixed_selection_rejects_out_of_range_index() {
        let groups = build_track_groups(&period());
        assert!(FixedTrackSelection::from_groups(&groups, 1, 1).is_none());
        assert!(FixedTrackSelection::from_groups(&groups, 2, 0).is_none());
        let selection = FixedTrackSelection::from_groups(&groups, 0, 2).unwrap();
        assert_eq!(selection.track_group_index(), 0);
        assert_eq!(selection.selected_format().unwrap().id, "v2");
    }
}
