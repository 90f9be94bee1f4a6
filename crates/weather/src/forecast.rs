//! Collapses the provider's 3-hourly samples into per-day summaries.

use crate::error::ProviderError;
use crate::model::{DailyForecast, ForecastSample};

pub const FORECAST_DAYS: usize = 3;

struct DayBucket {
    date: String,
    temperature_sum: f64,
    samples: usize,
    // Insertion order doubles as the tie-breaker for the modal label.
    labels: Vec<(String, usize)>,
}

impl DayBucket {
    fn new(date: &str) -> Self {
        Self { date: date.to_string(), temperature_sum: 0.0, samples: 0, labels: Vec::new() }
    }

    fn add(&mut self, temperature: f64, label: &str) {
        self.temperature_sum += temperature;
        self.samples += 1;
        match self.labels.iter_mut().find(|(existing, _)| existing == label) {
            Some((_, count)) => *count += 1,
            None => self.labels.push((label.to_string(), 1)),
        }
    }

    fn dominant_label(&self) -> String {
        let mut best: Option<&(String, usize)> = None;
        for candidate in &self.labels {
            if best.map(|(_, count)| candidate.1 > *count).unwrap_or(true) {
                best = Some(candidate);
            }
        }
        best.map(|(label, _)| label.clone()).unwrap_or_default()
    }

    fn finish(self) -> DailyForecast {
        let average_temperature = self.temperature_sum / self.samples as f64;
        DailyForecast {
            dominant_condition: self.dominant_label(),
            date: self.date,
            average_temperature,
        }
    }
}

/// Groups samples by calendar date, keeping the first `days` distinct dates in provider order.
pub(crate) fn summarize(
    samples: &[ForecastSample],
    days: usize,
) -> Result<Vec<DailyForecast>, ProviderError> {
    let mut buckets: Vec<DayBucket> = Vec::new();

    for sample in samples {
        let date = calendar_date(&sample.dt_txt)?;
        let label = sample
            .weather
            .first()
            .map(|condition| condition.description.as_str())
            .ok_or_else(|| ProviderError::Malformed(format!("sample {} has no condition", sample.dt_txt)))?;

        let index = match buckets.iter().position(|bucket| bucket.date == date) {
            Some(index) => index,
            None if buckets.len() == days => continue,
            None => {
                buckets.push(DayBucket::new(date));
                buckets.len() - 1
            }
        };
        buckets[index].add(sample.main.temp, label);
    }

    Ok(buckets.into_iter().map(DayBucket::finish).collect())
}

fn calendar_date(dt_txt: &str) -> Result<&str, ProviderError> {
    let date = dt_txt.get(..10).filter(|date| {
        let bytes = date.as_bytes();
        bytes[4] == b'-' && bytes[7] == b'-'
    });
    date.ok_or_else(|| ProviderError::Malformed(format!("unexpected sample timestamp `{dt_txt}`")))
}
