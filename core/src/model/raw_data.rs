use serde::{Deserialize, Serialize};

use super::SliType;

/// The measured value of one bucket, in the field its SLI type owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricValue {
    Availability {
        good_request: i64,
        valid_request: i64,
    },
    Latency(i64),
    Throughput(i64),
    Saturation(i64),
    Durability(i64),
    Correctness(i64),
}

impl MetricValue {
    /// Wraps a single value for `sli_type`; `None` for Availability, which
    /// always carries a good/valid pair.
    pub fn single(sli_type: SliType, value: i64) -> Option<Self> {
        match sli_type {
            SliType::Availability => None,
            SliType::Latency => Some(MetricValue::Latency(value)),
            SliType::Throughput => Some(MetricValue::Throughput(value)),
            SliType::Saturation => Some(MetricValue::Saturation(value)),
            SliType::Durability => Some(MetricValue::Durability(value)),
            SliType::Correctness => Some(MetricValue::Correctness(value)),
        }
    }

    pub fn sli_type(&self) -> SliType {
        match self {
            MetricValue::Availability { .. } => SliType::Availability,
            MetricValue::Latency(_) => SliType::Latency,
            MetricValue::Throughput(_) => SliType::Throughput,
            MetricValue::Saturation(_) => SliType::Saturation,
            MetricValue::Durability(_) => SliType::Durability,
            MetricValue::Correctness(_) => SliType::Correctness,
        }
    }
}

/// One measurement bucket `[start, end)` of an SLI, in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "RawDataWire", try_from = "RawDataWire")]
pub struct RawDataRecord {
    pub sli_id: i64,
    pub start: i64,
    pub end: i64,
    pub value: MetricValue,
}

/// Flat wire shape: every metric field is optional. Outgoing records set
/// exactly one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDataWire {
    sli_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latency: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    valid_request: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    good_request: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    throughput: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correctness: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saturation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    durability: Option<i64>,
    start: i64,
    end: i64,
}

impl From<RawDataRecord> for RawDataWire {
    fn from(record: RawDataRecord) -> Self {
        let mut wire = RawDataWire {
            sli_id: record.sli_id,
            start: record.start,
            end: record.end,
            ..Default::default()
        };
        match record.value {
            MetricValue::Availability {
                good_request,
                valid_request,
            } => {
                wire.good_request = Some(good_request);
                wire.valid_request = Some(valid_request);
            }
            MetricValue::Latency(v) => wire.latency = Some(v),
            MetricValue::Throughput(v) => wire.throughput = Some(v),
            MetricValue::Saturation(v) => wire.saturation = Some(v),
            MetricValue::Durability(v) => wire.durability = Some(v),
            MetricValue::Correctness(v) => wire.correctness = Some(v),
        }
        wire
    }
}

impl TryFrom<RawDataWire> for RawDataRecord {
    type Error = String;

    fn try_from(wire: RawDataWire) -> Result<Self, Self::Error> {
        let mut values = Vec::with_capacity(1);
        match (wire.good_request, wire.valid_request) {
            (Some(good_request), Some(valid_request)) => values.push(MetricValue::Availability {
                good_request,
                valid_request,
            }),
            (None, None) => {}
            _ => {
                return Err(format!(
                    "raw data for SLI {} has only one of goodRequest/validRequest",
                    wire.sli_id
                ));
            }
        }
        values.extend(wire.latency.map(MetricValue::Latency));
        values.extend(wire.throughput.map(MetricValue::Throughput));
        values.extend(wire.saturation.map(MetricValue::Saturation));
        values.extend(wire.durability.map(MetricValue::Durability));
        values.extend(wire.correctness.map(MetricValue::Correctness));

        match values.as_slice() {
            [value] => Ok(RawDataRecord {
                sli_id: wire.sli_id,
                start: wire.start,
                end: wire.end,
                value: *value,
            }),
            other => Err(format!(
                "raw data for SLI {} must carry exactly one metric, found {}",
                wire.sli_id,
                other.len()
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostManyRequest {
    pub org_id: i64,
    pub sli_type: String,
    pub raw_data: Vec<RawDataRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostManyResponse {
    #[serde(default)]
    pub sli_raw_data: Option<Vec<RawDataEcho>>,
}

/// A record as echoed back by the backend.
///
/// The backend omits zero-valued metric fields, so an echo may carry no
/// metric at all. It is only meaningful together with the batch's SLI type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDataEcho(RawDataWire);

impl RawDataEcho {
    /// Reads the field(s) owned by `sli_type`, a missing field meaning zero.
    pub fn into_record(self, sli_type: SliType) -> RawDataRecord {
        let wire = self.0;
        let value = match sli_type {
            SliType::Availability => MetricValue::Availability {
                good_request: wire.good_request.unwrap_or(0),
                valid_request: wire.valid_request.unwrap_or(0),
            },
            SliType::Latency => MetricValue::Latency(wire.latency.unwrap_or(0)),
            SliType::Throughput => MetricValue::Throughput(wire.throughput.unwrap_or(0)),
            SliType::Saturation => MetricValue::Saturation(wire.saturation.unwrap_or(0)),
            SliType::Durability => MetricValue::Durability(wire.durability.unwrap_or(0)),
            SliType::Correctness => MetricValue::Correctness(wire.correctness.unwrap_or(0)),
        };
        RawDataRecord {
            sli_id: wire.sli_id,
            start: wire.start,
            end: wire.end,
            value,
        }
    }
}

/// Backend acknowledgment of a batch: the records it accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostManyAck {
    pub records: Vec<RawDataRecord>,
}

impl PostManyAck {
    pub fn accepted(&self) -> usize {
        self.records.len()
    }
}

impl PostManyAck {
    /// Decodes the echo of a batch submitted as `sli_type`. A null echo is an
    /// empty acknowledgment.
    pub fn from_response(response: PostManyResponse, sli_type: SliType) -> Self {
        Self {
            records: response
                .sli_raw_data
                .unwrap_or_default()
                .into_iter()
                .map(|echo| echo.into_record(sli_type))
                .collect(),
        }
    }
}
