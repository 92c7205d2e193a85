//! Wire and domain types shared by the catalog, the mapper and the submitter.

mod raw_data;
mod sli;

pub use raw_data::{
    MetricValue, PostManyAck, PostManyRequest, PostManyResponse, RawDataEcho, RawDataRecord,
};
pub use sli::{
    AvailabilityPath, BLAMELESS_DATA_SOURCE_ID, GetSliRequest, MetricPath, MetricQuery,
    ParseSliTypeError, PostSliRequest, SliBody, SliFields, SliRecord, SliResponse, SliType,
    SliTypeRecord, SliTypeRequest, SliTypeResponse, build_sli_creation_request,
};
