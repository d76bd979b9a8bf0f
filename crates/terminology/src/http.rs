use async_trait::async_trait;
use serde::Deserialize;

use crate::client::{
    CodingRef, FhirClient, KnowledgeClient, LabDeviceQuery, LabResultQuery, LookupOutcome,
    Plausibility, TerminologyError, ValueSetOutcome,
};

/// Maps a non-2xx status to the right outcome or error, the way terminology
/// lookups are specified: 400 is a semantic "not found", anything else is a
/// collaborator error.
fn check_error(status: reqwest::StatusCode, body: String) -> TerminologyError {
    TerminologyError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    }
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    display: Vec<String>,
}

#[derive(Deserialize)]
struct ExpansionResponse {
    expansion: Expansion,
}

#[derive(Deserialize)]
struct Expansion {
    #[serde(default)]
    contains: Vec<ExpansionCoding>,
}

#[derive(Deserialize)]
struct ExpansionCoding {
    system: String,
    code: String,
}

#[derive(Deserialize)]
struct PlausibilityResponse {
    plausibility: Plausibility,
}

/// `reqwest`-backed FHIR terminology client.
pub struct HttpFhirClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFhirClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("FHIR_BASE_URL").ok().map(Self::new)
    }
}

#[async_trait]
impl FhirClient for HttpFhirClient {
    async fn lookup_code(&self, coding: &CodingRef) -> Result<LookupOutcome, TerminologyError> {
        let url = format!("{}/CodeSystem/$lookup", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("system", coding.system.as_str()), ("code", coding.code.as_str())])
            .send()
            .await
            .map_err(|e| TerminologyError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 400 {
            return Ok(LookupOutcome::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(check_error(status, body));
        }
        let parsed: LookupResponse = resp
            .json()
            .await
            .map_err(|e| TerminologyError::Malformed(e.to_string()))?;
        Ok(LookupOutcome::Found {
            displays: parsed.display,
        })
    }

    async fn get_value_set(
        &self,
        mnemonic_or_uri: &str,
    ) -> Result<ValueSetOutcome, TerminologyError> {
        let url = format!("{}/ValueSet/$expand", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("url", mnemonic_or_uri)])
            .send()
            .await
            .map_err(|e| TerminologyError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 400 {
            return Ok(ValueSetOutcome::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(check_error(status, body));
        }
        let parsed: ExpansionResponse = resp
            .json()
            .await
            .map_err(|e| TerminologyError::Malformed(e.to_string()))?;
        Ok(ValueSetOutcome::Expanded {
            codings: parsed
                .expansion
                .contains
                .into_iter()
                .map(|c| CodingRef {
                    system: c.system,
                    code: c.code,
                })
                .collect(),
        })
    }
}

/// `reqwest`-backed knowledge plausibility client.
pub struct HttpKnowledgeClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpKnowledgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("KNOWLEDGE_BASE_URL").ok().map(Self::new)
    }

    async fn fetch_plausibility(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Plausibility, TerminologyError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| TerminologyError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(check_error(status, body));
        }
        let parsed: PlausibilityResponse = resp
            .json()
            .await
            .map_err(|e| TerminologyError::Malformed(e.to_string()))?;
        Ok(parsed.plausibility)
    }
}

#[async_trait]
impl KnowledgeClient for HttpKnowledgeClient {
    async fn lab_result_plausibility(
        &self,
        query: &LabResultQuery,
    ) -> Result<Plausibility, TerminologyError> {
        self.fetch_plausibility(
            "/api/plausibility/lab-result",
            &[
                ("dob", query.date_of_birth.as_str()),
                ("testCode", query.test_code.as_str()),
                ("resultValue", query.result_value.as_str()),
                ("stamp", query.stamp.as_str()),
                ("lang", query.lang.as_str()),
                ("nav", query.nav.as_str()),
            ],
        )
        .await
    }

    async fn lab_device_plausibility(
        &self,
        query: &LabDeviceQuery,
    ) -> Result<Plausibility, TerminologyError> {
        self.fetch_plausibility(
            "/api/plausibility/lab-device",
            &[
                ("testCode", query.test_code.as_str()),
                ("refRangeLow", query.ref_range_low.as_str()),
                ("refRangeHigh", query.ref_range_high.as_str()),
                ("unit", query.unit.as_str()),
                ("stamp", query.stamp.as_str()),
                ("lang", query.lang.as_str()),
                ("nav", query.nav.as_str()),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fhir_client_from_env_none_when_unset() {
        unsafe {
            std::env::remove_var("FHIR_BASE_URL");
        }
        assert!(HttpFhirClient::from_env().is_none());
    }

    #[test]
    fn knowledge_client_from_env_reads_base_url() {
        unsafe {
            std::env::set_var("KNOWLEDGE_BASE_URL", "http://localhost:9999");
        }
        let client = HttpKnowledgeClient::from_env().expect("env var set");
        assert_eq!(client.base_url, "http://localhost:9999");
        unsafe {
            std::env::remove_var("KNOWLEDGE_BASE_URL");
        }
    }
}
