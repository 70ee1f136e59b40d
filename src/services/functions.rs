//! Callable Cloud Functions client

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, instrument};

use super::{read_upstream, transport_error};
use crate::error::ApiError;

const SERVICE: &str = "Cloud Functions";

/// Function that refreshes the caller's custom claims (`dbRole`, `committeeRank`, ...)
pub const UPDATE_USER_CLAIMS: &str = "updateUserClaims";

#[derive(Serialize)]
struct CallableRequest<'a, T: Serialize> {
    data: &'a T,
}

#[derive(Deserialize)]
struct CallableResponse<R> {
    result: R,
}

#[derive(Clone)]
pub struct FunctionsClient {
    client: Client,
    base_url: String,
}

impl FunctionsClient {
    /// `base_url` is `https://<region>-<project>.cloudfunctions.net`
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Invoke a callable function as the signed-in user
    #[instrument(skip(self, data, id_token))]
    pub async fn call<T: Serialize, R: DeserializeOwned>(
        &self,
        name: &str,
        data: &T,
        id_token: &str,
    ) -> Result<R, ApiError> {
        let url = format!("{}/{}", self.base_url, name);

        let response = self
            .client
            .post(&url)
            .bearer_auth(id_token)
            .json(&CallableRequest { data })
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let body: CallableResponse<R> = read_upstream(response, SERVICE).await?;
        Ok(body.result)
    }

    /// Ask the backend to recompute the caller's claims. Called with an empty argument
    /// right after sign-in.
    pub async fn update_user_claims(&self, id_token: &str) -> Result<(), ApiError> {
        let result: serde_json::Value = self.call(UPDATE_USER_CLAIMS, &"", id_token).await?;
        info!(result = %result, "User claims updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn callable_envelopes() {
        let request = serde_json::to_value(CallableRequest { data: &"" }).unwrap();
        assert_eq!(request, json!({ "data": "" }));

        let response: CallableResponse<serde_json::Value> =
            serde_json::from_value(json!({ "result": null })).unwrap();
        assert!(response.result.is_null());
    }
}
