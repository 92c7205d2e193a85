use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::BlamelessConfig;
use crate::errors::{BackendError, SubmitError};
use crate::model::{
    GetSliRequest, PostManyAck, PostManyRequest, PostManyResponse, PostSliRequest, RawDataRecord,
    SliRecord, SliResponse, SliType, SliTypeRequest, SliTypeResponse,
};
use crate::sink::{RawDataSink, SliCatalog};

const API_PREFIX: &str = "/api/v1/services";
const SLO_SERVICE: &str = "SLOServiceCrud";
const SLO_TIMESERIES_SERVICE: &str = "SLOTimeSeriesServiceCrud";

/// Client for the SLO backend's RPC-over-HTTP services.
///
/// Every call is a JSON `POST` to `{endpoint}/api/v1/services/{service}/{method}`
/// authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct BlamelessClient {
    client: reqwest::Client,
    endpoint: String,
    auth_token: String,
}

impl BlamelessClient {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
        }
    }

    pub fn from_config(config: &BlamelessConfig, client: reqwest::Client) -> Self {
        Self::new(client, config.endpoint.clone(), config.auth_token.clone())
    }

    fn url(&self, service: &str, method: &str) -> String {
        format!("{}{}/{}/{}", self.endpoint, API_PREFIX, service, method)
    }

    async fn post<Req, Resp>(
        &self,
        service: &str,
        method: &str,
        body: &Req,
    ) -> Result<Resp, BackendError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.url(service, method);
        debug!(%url, "Calling backend");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::Transport {
                status: Some(status.as_u16()),
                reason: text,
            });
        }
        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

impl SliCatalog for BlamelessClient {
    async fn get_sli(&self, org_id: i64, id: i64) -> Result<SliRecord, BackendError> {
        let request = GetSliRequest { org_id, id };
        let response: SliResponse = match self.post(SLO_SERVICE, "GetSLI", &request).await {
            Ok(response) => response,
            Err(BackendError::Rejected { status: 404, .. }) => {
                return Err(BackendError::NotFound { kind: "SLI", id });
            }
            Err(e) => return Err(e),
        };
        response.sli.ok_or(BackendError::NotFound { kind: "SLI", id })
    }

    async fn get_sli_type(&self, type_id: i64) -> Result<SliType, BackendError> {
        let request = SliTypeRequest { id: type_id };
        let not_found = BackendError::NotFound {
            kind: "SLI type",
            id: type_id,
        };
        let response: SliTypeResponse =
            match self.post(SLO_SERVICE, "GetSliType", &request).await {
                Ok(response) => response,
                Err(BackendError::Rejected { status: 404, .. }) => return Err(not_found),
                Err(e) => return Err(e),
            };

        let record = response.sli_type.ok_or(not_found)?;
        record.name.parse().map_err(|_| BackendError::Malformed {
            reason: format!("unknown SLI type name {:?} for id {}", record.name, record.id),
        })
    }

    async fn create_sli(&self, request: &PostSliRequest) -> Result<SliRecord, BackendError> {
        let response: SliResponse = self.post(SLO_SERVICE, "CreateSLI", request).await?;
        response.sli.ok_or_else(|| BackendError::Malformed {
            reason: "CreateSLI returned no SLI".to_string(),
        })
    }
}

impl RawDataSink for BlamelessClient {
    async fn submit_many(
        &self,
        org_id: i64,
        sli_type: SliType,
        records: &[RawDataRecord],
    ) -> Result<PostManyAck, SubmitError> {
        let request = PostManyRequest {
            org_id,
            sli_type: sli_type.wire_name().to_string(),
            raw_data: records.to_vec(),
        };
        let response: PostManyResponse = self
            .post(SLO_TIMESERIES_SERVICE, "SliRawDataPostMany", &request)
            .await?;
        Ok(PostManyAck::from_response(response, sli_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_service_and_method() {
        let client = BlamelessClient::new(reqwest::Client::new(), "https://slo.example.com/", "t");
        assert_eq!(
            client.url(SLO_SERVICE, "GetSLI"),
            "https://slo.example.com/api/v1/services/SLOServiceCrud/GetSLI"
        );
        assert_eq!(
            client.url(SLO_TIMESERIES_SERVICE, "SliRawDataPostMany"),
            "https://slo.example.com/api/v1/services/SLOTimeSeriesServiceCrud/SliRawDataPostMany"
        );
    }
}
