pub mod blameless;

use tracing::{debug, warn};

use crate::errors::{BackendError, SubmitError};
use crate::model::{PostManyAck, PostSliRequest, RawDataRecord, SliRecord, SliType};
use crate::retry::{RetryPolicy, retry};

/// Destination of mapped records. One call delivers one whole batch.
#[allow(async_fn_in_trait)]
pub trait RawDataSink {
    async fn submit_many(
        &self,
        org_id: i64,
        sli_type: SliType,
        records: &[RawDataRecord],
    ) -> Result<PostManyAck, SubmitError>;
}

/// Lookup of SLI definitions and their types.
#[allow(async_fn_in_trait)]
pub trait SliCatalog {
    /// Fails with [`BackendError::NotFound`] for unknown ids.
    async fn get_sli(&self, org_id: i64, id: i64) -> Result<SliRecord, BackendError>;

    /// Fails with [`BackendError::NotFound`] for unknown ids.
    async fn get_sli_type(&self, type_id: i64) -> Result<SliType, BackendError>;

    async fn create_sli(&self, request: &PostSliRequest) -> Result<SliRecord, BackendError>;
}

impl<T: RawDataSink + ?Sized> RawDataSink for &T {
    async fn submit_many(
        &self,
        org_id: i64,
        sli_type: SliType,
        records: &[RawDataRecord],
    ) -> Result<PostManyAck, SubmitError> {
        (**self).submit_many(org_id, sli_type, records).await
    }
}

impl<T: SliCatalog + ?Sized> SliCatalog for &T {
    async fn get_sli(&self, org_id: i64, id: i64) -> Result<SliRecord, BackendError> {
        (**self).get_sli(org_id, id).await
    }

    async fn get_sli_type(&self, type_id: i64) -> Result<SliType, BackendError> {
        (**self).get_sli_type(type_id).await
    }

    async fn create_sli(&self, request: &PostSliRequest) -> Result<SliRecord, BackendError> {
        (**self).create_sli(request).await
    }
}

/// Submits whole batches, retrying transport failures under a fixed policy.
///
/// Rejections and undecodable responses are returned on the first attempt.
/// A batch is never split, so a retry resends exactly the same records and
/// the backend deduplicates them.
#[derive(Debug, Clone)]
pub struct BatchSubmitter<K> {
    sink: K,
    policy: RetryPolicy,
}

impl<K: RawDataSink> BatchSubmitter<K> {
    pub fn new(sink: K, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    pub async fn submit(
        &self,
        org_id: i64,
        sli_type: SliType,
        records: &[RawDataRecord],
    ) -> Result<PostManyAck, SubmitError> {
        let sink = &self.sink;
        let ack = retry(&self.policy, "submit_many", move || {
            sink.submit_many(org_id, sli_type, records)
        })
        .await?;

        if ack.accepted() != records.len() {
            warn!(
                org_id,
                submitted = records.len(),
                accepted = ack.accepted(),
                "Backend acknowledged a different number of records than submitted"
            );
        } else {
            debug!(org_id, accepted = ack.accepted(), "Batch accepted");
        }
        Ok(ack)
    }
}
