use async_trait::async_trait;
use meridian_recommend::{Candidate, CatalogError, CatalogRequest, CatalogSource};
use parking_lot::Mutex;
use std::sync::Arc;

/// Returns the same candidates for every request and records the requests.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    candidates: Vec<Candidate>,
    requests: Arc<Mutex<Vec<CatalogRequest>>>,
}

impl StaticCatalog {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<CatalogRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn candidates(&self, request: &CatalogRequest) -> Result<Vec<Candidate>, CatalogError> {
        self.requests.lock().push(request.clone());
        Ok(self.candidates.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailingCatalog;

#[async_trait]
impl CatalogSource for FailingCatalog {
    async fn candidates(&self, _request: &CatalogRequest) -> Result<Vec<Candidate>, CatalogError> {
        Err(CatalogError::Unavailable("scripted failure".to_string()))
    }
}
