//! Twilio REST client used to resolve a call SID to its destination number.

use serde::Deserialize;
use tracing::debug;

use super::DirectoryError;

/// Subset of the Twilio call resource we care about.
#[derive(Debug, Deserialize)]
struct CallResource {
    /// The phone number the caller dialed (E.164).
    to: Option<String>,
}

/// Fetches call metadata from the Twilio REST API.
pub struct TwilioCallLookup {
    client: reqwest::Client,
    api_url: String,
    account_sid: String,
    auth_token: String,
}

impl TwilioCallLookup {
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        account_sid: String,
        auth_token: String,
    ) -> Self {
        Self {
            client,
            api_url,
            account_sid,
            auth_token,
        }
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.api_url, self.account_sid, call_sid
        )
    }

    /// Resolve the destination number (`to`) for a call.
    pub async fn destination_number(&self, call_sid: &str) -> Result<String, DirectoryError> {
        let url = self.call_url(call_sid);
        debug!(call_sid = %call_sid, "Fetching call resource");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DirectoryError::Status(response.status().as_u16()));
        }

        let call: CallResource = response.json().await?;
        call.to.ok_or(DirectoryError::MissingDestination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lookup_for(server_url: &str) -> TwilioCallLookup {
        TwilioCallLookup::new(
            reqwest::Client::new(),
            server_url.to_string(),
            "AC123".to_string(),
            "secret".to_string(),
        )
    }

    #[test]
    fn test_call_url_shape() {
        let lookup = lookup_for("https://api.twilio.com");
        assert_eq!(
            lookup.call_url("CA42"),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls/CA42.json"
        );
    }

    #[tokio::test]
    async fn test_destination_number_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2010-04-01/Accounts/AC123/Calls/CA42.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sid": "CA42",
                "to": "+15551230000",
                "from": "+15550001111",
                "status": "in-progress"
            })))
            .mount(&server)
            .await;

        let lookup = lookup_for(&server.uri());
        let number = lookup.destination_number("CA42").await.unwrap();
        assert_eq!(number, "+15551230000");
    }

    #[tokio::test]
    async fn test_destination_number_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let lookup = lookup_for(&server.uri());
        let err = lookup.destination_number("CA42").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Status(404)));
    }

    #[tokio::test]
    async fn test_destination_number_missing_to() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "sid": "CA42" })),
            )
            .mount(&server)
            .await;

        let lookup = lookup_for(&server.uri());
        let err = lookup.destination_number("CA42").await.unwrap_err();
        assert!(matches!(err, DirectoryError::MissingDestination));
    }
}
