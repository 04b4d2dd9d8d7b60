use crate::payments::error::{PaymentError, PaymentResult};
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    provider: &'static str,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(provider: &'static str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::Unreachable {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            provider,
            timeout,
            max_retries,
        })
    }

    /// POSTs `body` and decodes the JSON reply. Network failures, 429 and 5xx
    /// are retried with exponential backoff; 4xx is returned immediately.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &JsonValue,
    ) -> PaymentResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let response = self
                .client
                .post(url)
                .timeout(self.timeout)
                .json(body)
                .send()
                .await
                .map_err(|e| PaymentError::Unreachable {
                    message: format!("{} request failed: {}", self.provider, e),
                });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let retry_after = retry_after_seconds(resp.headers());
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            PaymentError::MalformedReply {
                                message: format!("{} returned invalid JSON: {}", self.provider, e),
                            }
                        });
                    }

                    if status.as_u16() == 429 {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                            continue;
                        }
                        return Err(PaymentError::Throttled {
                            retry_after_seconds: retry_after,
                        });
                    }

                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(
                            provider = self.provider,
                            status = %status,
                            attempt = attempt + 1,
                            "provider server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    return Err(PaymentError::UpstreamStatus {
                        status: status.as_u16(),
                        body: text,
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::Unreachable {
            message: format!("{} request failed", self.provider),
        }))
    }
}

fn retry_after_seconds(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn msisdn_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(?:\+?254|0)?([71]\d{8})$").ok())
        .as_ref()
}

/// Normalizes a Kenyan mobile number to `2547XXXXXXXX` / `2541XXXXXXXX`.
///
/// Accepts local (`07..`, `01..`), international (`+254..`, `254..`) and bare
/// subscriber forms; spaces and dashes are ignored.
pub fn normalize_msisdn(phone: &str) -> PaymentResult<String> {
    let compact: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    msisdn_pattern()
        .and_then(|pattern| pattern.captures(&compact))
        .and_then(|caps| caps.get(1))
        .map(|subscriber| format!("254{}", subscriber.as_str()))
        .ok_or_else(|| {
            PaymentError::invalid(
                "phone",
                format!("'{}' is not a valid Safaricom/Airtel mobile number", phone),
            )
        })
}
