//! Conversion of raw source samples into typed SLI records.
//!
//! Each sample becomes one record covering `[timestamp, timestamp + step)`.
//! Values are parsed as floating point and truncated toward zero, so `"12.9"`
//! is stored as `12`. Availability values are usually fractional rates and are
//! scaled by [`AVAILABILITY_SCALE`] before flooring, so `0.98` is stored as
//! `98`. A value that is not a finite number fails the whole batch; nothing is
//! dropped silently.

use std::cmp::Ordering;

use tracing::warn;

use crate::errors::MapError;
use crate::model::{MetricValue, RawDataRecord, SliType};
use crate::source::Sample;

/// Factor applied to good and valid request values. Both sides are scaled
/// alike, so their ratio is unchanged.
pub const AVAILABILITY_SCALE: f64 = 100.0;

/// Maps the samples of a single-series SLI, preserving their order.
///
/// Availability SLIs are rejected with [`MapError::UnsupportedType`]; they
/// are built from two series by [`map_availability`].
pub fn map_samples(
    sli_id: i64,
    samples: &[Sample],
    sli_type: SliType,
    step_seconds: u32,
) -> Result<Vec<RawDataRecord>, MapError> {
    if MetricValue::single(sli_type, 0).is_none() {
        return Err(MapError::UnsupportedType(sli_type));
    }

    samples
        .iter()
        .map(|sample| {
            let parsed = parse_value(sli_id, sample)?;
            let value =
                MetricValue::single(sli_type, parsed).ok_or(MapError::UnsupportedType(sli_type))?;
            Ok(record(sli_id, sample.timestamp, step_seconds, value))
        })
        .collect()
}

/// Joins the good and valid request series of an Availability SLI on their
/// timestamps.
///
/// Values are multiplied by [`AVAILABILITY_SCALE`] and floored.
/// Both inputs must be in ascending timestamp order. Timestamps present in
/// only one series produce no record and are reported at warn level. Every
/// value is parsed, matched or not, so a malformed sample always fails.
pub fn map_availability(
    sli_id: i64,
    good: &[Sample],
    valid: &[Sample],
    step_seconds: u32,
) -> Result<Vec<RawDataRecord>, MapError> {
    let good_values = parse_scaled(sli_id, good)?;
    let valid_values = parse_scaled(sli_id, valid)?;

    let mut records = Vec::with_capacity(good.len().min(valid.len()));
    let mut unmatched = 0usize;
    let (mut i, mut j) = (0, 0);

    while i < good_values.len() && j < valid_values.len() {
        let (good_ts, good_request) = good_values[i];
        let (valid_ts, valid_request) = valid_values[j];
        match good_ts.cmp(&valid_ts) {
            Ordering::Equal => {
                records.push(record(
                    sli_id,
                    good_ts,
                    step_seconds,
                    MetricValue::Availability {
                        good_request,
                        valid_request,
                    },
                ));
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                unmatched += 1;
                i += 1;
            }
            Ordering::Greater => {
                unmatched += 1;
                j += 1;
            }
        }
    }
    unmatched += (good_values.len() - i) + (valid_values.len() - j);

    if unmatched > 0 {
        warn!(
            sli_id,
            unmatched,
            matched = records.len(),
            "Good and valid request series are not aligned, unmatched samples skipped"
        );
    }
    Ok(records)
}

fn record(sli_id: i64, timestamp: i64, step_seconds: u32, value: MetricValue) -> RawDataRecord {
    RawDataRecord {
        sli_id,
        start: timestamp,
        end: timestamp + i64::from(step_seconds),
        value,
    }
}

fn parse_scaled(sli_id: i64, samples: &[Sample]) -> Result<Vec<(i64, i64)>, MapError> {
    samples
        .iter()
        .map(|sample| {
            let value = parse_finite(sli_id, sample)? * AVAILABILITY_SCALE;
            Ok((sample.timestamp, value.floor() as i64))
        })
        .collect()
}

fn parse_value(sli_id: i64, sample: &Sample) -> Result<i64, MapError> {
    Ok(parse_finite(sli_id, sample)?.trunc() as i64)
}

fn parse_finite(sli_id: i64, sample: &Sample) -> Result<f64, MapError> {
    match sample.value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(MapError::ValueParse {
            sli_id,
            timestamp: sample.timestamp,
            value: sample.value.clone(),
        }),
    }
}
