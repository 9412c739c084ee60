use chrono::{DateTime, Utc};

use crate::error::ManifestError;
use crate::mpd::{AdaptationSet, DashManifest, Format, Period, Representation, TrackType};

/// Builds [`DashManifest`] values in code.
///
/// Representations are appended to the most recently added adaptation set,
/// which in turn belongs to the most recently added period.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    pub dynamic: bool,
    pub availability_start_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub min_update_period_ms: Option<u64>,
    pub time_shift_buffer_depth_ms: Option<u64>,
    pub periods: Vec<Period>,
    segment_duration: u64,
    timescale: u64,
    missing_adaptation_set: bool,
}

impl ManifestBuilder {
    pub fn live() -> Self {
        Self {
            dynamic: true,
            availability_start_time: Some(Utc::now()),
            duration_ms: None,
            min_update_period_ms: Some(5_000),
            time_shift_buffer_depth_ms: Some(60_000),
            periods: vec![],
            segment_duration: 1,
            timescale: 1,
            missing_adaptation_set: false,
        }
    }

    pub fn on_demand(duration_ms: u64) -> Self {
        Self {
            dynamic: false,
            availability_start_time: None,
            duration_ms: Some(duration_ms),
            min_update_period_ms: None,
            time_shift_buffer_depth_ms: None,
            ..Self::live()
        }
    }

    /**
     * Set the availability start time for the manifest.
     * This is the time when the first segment is available for playback.
     */
    pub fn availability_start(mut self, time: DateTime<Utc>) -> Self {
        self.availability_start_time = Some(time);
        self
    }

    /**
     * Set the time shift buffer depth, the window the player can rewind
     * in a live stream.
     */
    pub fn time_shift_buffer(mut self, ms: u64) -> Self {
        self.time_shift_buffer_depth_ms = Some(ms);
        self
    }

    pub fn minimum_update_period(mut self, ms: u64) -> Self {
        self.min_update_period_ms = Some(ms);
        self
    }

    /**
     * Set the segment duration and timescale used by representations added
     * after this call. The segment length in seconds is `duration / timescale`.
     */
    pub fn segment_duration(mut self, duration: u64, timescale: u64) -> Self {
        self.segment_duration = duration;
        self.timescale = timescale.max(1);
        self
    }

    pub fn add_period(mut self, id: &str, start_ms: u64) -> Self {
        self.periods.push(Period {
            id: Some(id.to_string()),
            start_ms,
            adaptation_sets: vec![],
        });
        self
    }

    /// Adds an adaptation set to the last period, creating a period at 0 if there is none.
    pub fn add_adaptation_set(mut self, track_type: TrackType) -> Self {
        if self.periods.is_empty() {
            self = self.add_period("0", 0);
        }
        if let Some(period) = self.periods.last_mut() {
            let id = period.adaptation_sets.len() as u32;
            period.adaptation_sets.push(AdaptationSet {
                id,
                track_type,
                representations: vec![],
            });
        }
        self
    }

    /**
     * Add a new representation to the last adaptation set.
     * Each representation is a different quality level of the same content.
     * Segments are numbered using the $Number%09d$ placeholder.
     */
    pub fn add_representation(mut self, format: Format) -> Self {
        let segment_duration = self.segment_duration as f64 / self.timescale as f64;
        let timescale = self.timescale;
        let adaptation_set = self
            .periods
            .last_mut()
            .and_then(|period| period.adaptation_sets.last_mut());
        match adaptation_set {
            Some(adaptation_set) => adaptation_set.representations.push(Representation {
                initialization: format!("{}/init.mp4", format.id),
                media: format!("{}/$Number%09d$.m4s", format.id),
                format,
                segment_duration,
                timescale,
            }),
            None => self.missing_adaptation_set = true,
        }
        self
    }

    pub fn build(self) -> Result<DashManifest, ManifestError> {
        if self.missing_adaptation_set {
            return Err(ManifestError::MissingAdaptationSet);
        }
        if self.periods.is_empty() {
            return Err(ManifestError::NoPeriods);
        }
        for (period_index, period) in self.periods.iter().enumerate() {
            if period_index > 0 && period.start_ms < self.periods[period_index - 1].start_ms {
                return Err(ManifestError::UnorderedPeriods { start_ms: period.start_ms });
            }
            if let Some(adaptation_set) = period
                .adaptation_sets
                .iter()
                .position(|set| set.representations.is_empty())
            {
                return Err(ManifestError::EmptyAdaptationSet {
                    period: period_index,
                    adaptation_set,
                });
            }
        }

        Ok(DashManifest {
            dynamic: self.dynamic,
            availability_start_time: self.availability_start_time,
            duration_ms: self.duration_ms,
            min_update_period_ms: self.min_update_period_ms,
            time_shift_buffer_depth_ms: self.time_shift_buffer_depth_ms,
            periods: self.periods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn representations_land_in_last_adaptation_set() {
        let manifest = ManifestBuilder::on_demand(10_000)
            .segment_duration(2_000, 1_000)
            .add_adaptation_set(TrackType::Video)
            .add_representation(Format::new("v0", "video/mp4", "avc1.42E01E", 500_000))
            .add_representation(Format::new("v1", "video/mp4", "avc1.42E01E", 1_000_000))
            .add_adaptation_set(TrackType::Audio)
            .add_representation(Format::new("a0", "audio/mp4", "mp4a.40.2", 64_000))
            .build()
            .unwrap();

        let period = &manifest.periods[0];
        assert_eq!(period.adaptation_sets.len(), 2);
        assert_eq!(period.adaptation_sets[0].representations.len(), 2);
        assert_eq!(period.adaptation_sets[1].id, 1);
        let rep = &period.adaptation_sets[0].representations[1];
        assert_eq!(rep.segment_duration, 2.0);
        assert_eq!(rep.media, "v1/$Number%09d$.m4s");
        assert!(!manifest.dynamic);
    }

    #[test]
    fn rejects_empty_adaptation_sets() {
        let result = ManifestBuilder::live()
            .add_adaptation_set(TrackType::Video)
            .build();
        assert_eq!(
            result,
            Err(ManifestError::EmptyAdaptationSet { period: 0, adaptation_set: 0 })
        );
    }

    #[test]
    fn rejects_representation_without_adaptation_set() {
        let result = ManifestBuilder::live()
            .add_representation(Format::new("v0", "video/mp4", "avc1", 1))
            .build();
        assert_eq!(result, Err(ManifestError::MissingAdaptationSet));
        assert_eq!(ManifestBuilder::live().build(), Err(ManifestError::NoPeriods));
    }
}
