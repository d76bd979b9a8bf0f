use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{
    CodingRef, FhirClient, KnowledgeClient, LabDeviceQuery, LabResultQuery, LookupOutcome,
    Plausibility, TerminologyError, ValueSetOutcome,
};

/// Scripted FHIR client for tests. Defaults to [`LookupOutcome::Found`] with
/// no displays for any coding not explicitly scripted, so a test that only
/// cares about one coding doesn't need to enumerate every lookup.
pub struct MockFhirClient {
    lookups: Mutex<HashMap<(String, String), Result<LookupOutcome, TerminologyError>>>,
    value_sets: Mutex<HashMap<String, Result<ValueSetOutcome, TerminologyError>>>,
}

impl MockFhirClient {
    pub fn new() -> Self {
        Self {
            lookups: Mutex::new(HashMap::new()),
            value_sets: Mutex::new(HashMap::new()),
        }
    }

    pub fn script_lookup(&self, coding: &CodingRef, outcome: Result<LookupOutcome, TerminologyError>) {
        self.lookups
            .lock()
            .unwrap()
            .insert((coding.system.clone(), coding.code.clone()), outcome);
    }

    pub fn script_value_set(&self, key: impl Into<String>, outcome: Result<ValueSetOutcome, TerminologyError>) {
        self.value_sets.lock().unwrap().insert(key.into(), outcome);
    }
}

impl Default for MockFhirClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FhirClient for MockFhirClient {
    async fn lookup_code(&self, coding: &CodingRef) -> Result<LookupOutcome, TerminologyError> {
        self.lookups
            .lock()
            .unwrap()
            .get(&(coding.system.clone(), coding.code.clone()))
            .cloned()
            .unwrap_or(Ok(LookupOutcome::Found { displays: vec![] }))
    }

    async fn get_value_set(
        &self,
        mnemonic_or_uri: &str,
    ) -> Result<ValueSetOutcome, TerminologyError> {
        self.value_sets
            .lock()
            .unwrap()
            .get(mnemonic_or_uri)
            .cloned()
            .unwrap_or(Ok(ValueSetOutcome::NotFound))
    }
}

/// Scripted knowledge client. Defaults to [`Plausibility::Unknown`] for any
/// unscripted test code.
pub struct MockKnowledgeClient {
    lab_result: Mutex<HashMap<String, Result<Plausibility, TerminologyError>>>,
    lab_device: Mutex<HashMap<String, Result<Plausibility, TerminologyError>>>,
}

impl MockKnowledgeClient {
    pub fn new() -> Self {
        Self {
            lab_result: Mutex::new(HashMap::new()),
            lab_device: Mutex::new(HashMap::new()),
        }
    }

    pub fn script_lab_result(&self, test_code: impl Into<String>, outcome: Result<Plausibility, TerminologyError>) {
        self.lab_result.lock().unwrap().insert(test_code.into(), outcome);
    }

    pub fn script_lab_device(&self, test_code: impl Into<String>, outcome: Result<Plausibility, TerminologyError>) {
        self.lab_device.lock().unwrap().insert(test_code.into(), outcome);
    }
}

impl Default for MockKnowledgeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeClient for MockKnowledgeClient {
    async fn lab_result_plausibility(
        &self,
        query: &LabResultQuery,
    ) -> Result<Plausibility, TerminologyError> {
        self.lab_result
            .lock()
            .unwrap()
            .get(&query.test_code)
            .cloned()
            .unwrap_or(Ok(Plausibility::Unknown))
    }

    async fn lab_device_plausibility(
        &self,
        query: &LabDeviceQuery,
    ) -> Result<Plausibility, TerminologyError> {
        self.lab_device
            .lock()
            .unwrap()
            .get(&query.test_code)
            .cloned()
            .unwrap_or(Ok(Plausibility::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_lookup_is_found_empty() {
        let client = MockFhirClient::new();
        let outcome = client
            .lookup_code(&CodingRef {
                system: "http://loinc.org".into(),
                code: "1234-5".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, LookupOutcome::Found { displays: vec![] });
    }

    #[tokio::test]
    async fn scripted_lookup_returns_not_found() {
        let client = MockFhirClient::new();
        let coding = CodingRef {
            system: "http://loinc.org".into(),
            code: "9999-9".into(),
        };
        client.script_lookup(&coding, Ok(LookupOutcome::NotFound));
        let outcome = client.lookup_code(&coding).await.unwrap();
        assert_eq!(outcome, LookupOutcome::NotFound);
    }

    #[tokio::test]
    async fn default_plausibility_is_unknown() {
        let client = MockKnowledgeClient::new();
        let outcome = client
            .lab_result_plausibility(&LabResultQuery {
                date_of_birth: "1990-01-01".into(),
                test_code: "GLU".into(),
                result_value: "90".into(),
                stamp: "now".into(),
                lang: "en".into(),
                nav: "na".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, Plausibility::Unknown);
    }
}
