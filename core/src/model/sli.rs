use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ValidationError;

/// Data source id the backend uses for SLIs fed through its public API.
pub const BLAMELESS_DATA_SOURCE_ID: i64 = 5;

/// Category of measurement; decides which record field carries the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliType {
    Availability,
    Latency,
    Throughput,
    Saturation,
    Durability,
    Correctness,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown SLI type {0:?}")]
pub struct ParseSliTypeError(pub String);

impl SliType {
    pub const ALL: [SliType; 6] = [
        SliType::Availability,
        SliType::Latency,
        SliType::Throughput,
        SliType::Saturation,
        SliType::Durability,
        SliType::Correctness,
    ];

    /// Backend type id.
    pub fn id(self) -> i64 {
        match self {
            SliType::Availability => 1,
            SliType::Latency => 2,
            SliType::Throughput => 3,
            SliType::Saturation => 4,
            SliType::Durability => 5,
            SliType::Correctness => 6,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            SliType::Availability => "Availability",
            SliType::Latency => "Latency",
            SliType::Throughput => "Throughput",
            SliType::Saturation => "Saturation",
            SliType::Durability => "Durability",
            SliType::Correctness => "Correctness",
        }
    }

    /// Lower-case name used as the `sliType` of a raw data batch.
    pub fn wire_name(self) -> &'static str {
        match self {
            SliType::Availability => "availability",
            SliType::Latency => "latency",
            SliType::Throughput => "throughput",
            SliType::Saturation => "saturation",
            SliType::Durability => "durability",
            SliType::Correctness => "correctness",
        }
    }
}

impl fmt::Display for SliType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SliType {
    type Err = ParseSliTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseSliTypeError(s.to_string()))
    }
}

/// The query expression(s) of an SLI, keyed by its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricQuery {
    Availability {
        good_request: String,
        valid_request: String,
    },
    Latency(String),
    Throughput(String),
    Saturation(String),
    Durability(String),
    Correctness(String),
}

impl MetricQuery {
    /// Builds a single-expression query. Availability needs two expressions
    /// and is rejected here; use [`MetricQuery::availability`].
    pub fn single(sli_type: SliType, expression: impl Into<String>) -> Result<Self, ValidationError> {
        let expression = non_blank("query", expression.into())?;
        match sli_type {
            SliType::Availability => Err(ValidationError::new(
                "query",
                "availability SLIs need a good request and a valid request query",
            )),
            SliType::Latency => Ok(MetricQuery::Latency(expression)),
            SliType::Throughput => Ok(MetricQuery::Throughput(expression)),
            SliType::Saturation => Ok(MetricQuery::Saturation(expression)),
            SliType::Durability => Ok(MetricQuery::Durability(expression)),
            SliType::Correctness => Ok(MetricQuery::Correctness(expression)),
        }
    }

    pub fn availability(
        good_request: impl Into<String>,
        valid_request: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(MetricQuery::Availability {
            good_request: non_blank("goodRequest", good_request.into())?,
            valid_request: non_blank("validRequest", valid_request.into())?,
        })
    }

    pub fn sli_type(&self) -> SliType {
        match self {
            MetricQuery::Availability { .. } => SliType::Availability,
            MetricQuery::Latency(_) => SliType::Latency,
            MetricQuery::Throughput(_) => SliType::Throughput,
            MetricQuery::Saturation(_) => SliType::Saturation,
            MetricQuery::Durability(_) => SliType::Durability,
            MetricQuery::Correctness(_) => SliType::Correctness,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            MetricQuery::Availability {
                good_request,
                valid_request,
            } => {
                non_blank("goodRequest", good_request.clone())?;
                non_blank("validRequest", valid_request.clone())?;
            }
            MetricQuery::Latency(q)
            | MetricQuery::Throughput(q)
            | MetricQuery::Saturation(q)
            | MetricQuery::Durability(q)
            | MetricQuery::Correctness(q) => {
                non_blank("query", q.clone())?;
            }
        }
        Ok(())
    }

    pub fn to_metric_path(&self) -> MetricPath {
        let mut path = MetricPath::default();
        match self {
            MetricQuery::Availability {
                good_request,
                valid_request,
            } => {
                path.availability = Some(AvailabilityPath {
                    good_request: good_request.clone(),
                    valid_request: valid_request.clone(),
                })
            }
            MetricQuery::Latency(q) => path.latency = Some(q.clone()),
            MetricQuery::Throughput(q) => path.throughput = Some(q.clone()),
            MetricQuery::Saturation(q) => path.saturation = Some(q.clone()),
            MetricQuery::Durability(q) => path.durability = Some(q.clone()),
            MetricQuery::Correctness(q) => path.correctness = Some(q.clone()),
        }
        path
    }
}

impl fmt::Display for MetricQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricQuery::Availability {
                good_request,
                valid_request,
            } => write!(f, "good: {good_request}; valid: {valid_request}"),
            MetricQuery::Latency(q)
            | MetricQuery::Throughput(q)
            | MetricQuery::Saturation(q)
            | MetricQuery::Durability(q)
            | MetricQuery::Correctness(q) => f.write_str(q),
        }
    }
}

fn non_blank(field: &'static str, value: String) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field, "must not be blank"))
    } else {
        Ok(value)
    }
}

/// Type-keyed query structure stored JSON-encoded in an SLI's `metricPath`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPath {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<AvailabilityPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correctness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durability: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityPath {
    #[serde(default)]
    pub good_request: String,
    #[serde(default)]
    pub valid_request: String,
}

impl TryFrom<MetricPath> for MetricQuery {
    type Error = ValidationError;

    fn try_from(path: MetricPath) -> Result<Self, Self::Error> {
        let present = |q: Option<String>| q.filter(|q| !q.trim().is_empty());
        let mut found = Vec::new();

        if let Some(q) = present(path.latency) {
            found.push(MetricQuery::Latency(q));
        }
        if let Some(a) = path.availability {
            found.push(MetricQuery::availability(a.good_request, a.valid_request)?);
        }
        if let Some(q) = present(path.throughput) {
            found.push(MetricQuery::Throughput(q));
        }
        if let Some(q) = present(path.saturation) {
            found.push(MetricQuery::Saturation(q));
        }
        if let Some(q) = present(path.correctness) {
            found.push(MetricQuery::Correctness(q));
        }
        if let Some(q) = present(path.durability) {
            found.push(MetricQuery::Durability(q));
        }

        match found.len() {
            1 => Ok(found.remove(0)),
            n => Err(ValidationError::new(
                "metricPath",
                format!("expected exactly one metric query, found {n}"),
            )),
        }
    }
}

/// An SLI as stored by the backend catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliRecord {
    #[serde(default)]
    pub org_id: i64,
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data_source_id: i64,
    pub sli_type_id: i64,
    #[serde(default)]
    pub service_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_path: Option<String>,
}

impl SliRecord {
    /// Decodes the JSON-encoded `metricPath` into a typed query.
    pub fn metric_query(&self) -> Result<MetricQuery, ValidationError> {
        let raw = self
            .metric_path
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .ok_or_else(|| ValidationError::new("metricPath", "missing"))?;
        let path: MetricPath = serde_json::from_str(raw)
            .map_err(|e| ValidationError::new("metricPath", e.to_string()))?;
        MetricQuery::try_from(path)
    }
}

/// Creation payload for a new SLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliBody {
    pub name: String,
    pub description: String,
    pub data_source_id: i64,
    pub sli_type_id: i64,
    pub service_id: i64,
    pub metric_path: String,
}

/// Caller-supplied fields of a new SLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliFields {
    pub name: String,
    pub description: String,
    pub service_id: i64,
    pub query: MetricQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSliRequest {
    pub org_id: i64,
    pub model: SliBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSliRequest {
    pub org_id: i64,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliResponse {
    #[serde(default)]
    pub sli: Option<SliRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliTypeRequest {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliTypeRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliTypeResponse {
    #[serde(default)]
    pub sli_type: Option<SliTypeRecord>,
}

/// Builds the catalog request that creates an SLI from plain fields.
pub fn build_sli_creation_request(
    org_id: i64,
    fields: SliFields,
) -> Result<PostSliRequest, ValidationError> {
    let name = non_blank("name", fields.name)?;
    let description = non_blank("description", fields.description)?;
    fields.query.validate()?;

    let metric_path = serde_json::to_string(&fields.query.to_metric_path())
        .map_err(|e| ValidationError::new("metricPath", e.to_string()))?;

    Ok(PostSliRequest {
        org_id,
        model: SliBody {
            name,
            description,
            data_source_id: BLAMELESS_DATA_SOURCE_ID,
            sli_type_id: fields.query.sli_type().id(),
            service_id: fields.service_id,
            metric_path,
        },
    })
}
