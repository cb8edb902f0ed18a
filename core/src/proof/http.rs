//! HTTP Prover Client
//!
//! Client for a remote withdrawal prover service.
//!
//! ```text
//! ┌──────────────────────────────┐        ┌──────────────────────────────┐
//! │  ProofOrchestrator           │        │  Prover service              │
//! │                              │  POST  │                              │
//! │  HttpProofBackend::prove() ──┼───────►│  /v1/withdraw/prove → job_id │
//! │                              │  GET   │                              │
//! │          poll ───────────────┼───────►│  /v1/withdraw/{job_id}       │
//! │                              │ DELETE │                              │
//! │  release() ──────────────────┼───────►│  /v1/withdraw/{job_id}       │
//! └──────────────────────────────┘        └──────────────────────────────┘
//! ```

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{CircuitInputs, Proof, ProofBackend};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpProverConfig {
    /// Base URL of the prover service (e.g., "http://localhost:8090")
    pub url: String,
    /// Timeout for one proof (default: 5 minutes)
    pub proof_timeout: Duration,
    /// Polling interval for status checks
    pub poll_interval: Duration,
}

impl Default for HttpProverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8090".to_string(),
            proof_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(500),
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct ProveRequest {
    input: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct ProveJob {
    job_id: String,
}

/// API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Success {
        data: T,
    },
    Error {
        message: String,
        code: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofJobState {
    Pending,
    Proving,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Deserialize)]
struct ProofJobStatus {
    state: ProofJobState,
    /// Hex-encoded proof once completed
    #[serde(default)]
    proof: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

pub struct HttpProofBackend {
    config: HttpProverConfig,
    client: reqwest::Client,
    /// Job submitted but not yet finished or cancelled
    active_job: Mutex<Option<String>>,
}

impl HttpProofBackend {
    pub fn new(config: HttpProverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.proof_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            client,
            active_job: Mutex::new(None),
        })
    }

    fn set_active(&self, job: Option<String>) {
        if let Ok(mut active) = self.active_job.lock() {
            *active = job;
        }
    }

    fn take_active(&self) -> Option<String> {
        self.active_job.lock().ok().and_then(|mut a| a.take())
    }

    async fn submit(&self, inputs: &CircuitInputs) -> Result<ProveJob> {
        let url = format!("{}/v1/withdraw/prove", self.config.url);

        let response = self
            .client
            .post(&url)
            .json(&ProveRequest {
                input: inputs.to_json(),
            })
            .send()
            .await
            .context("Failed to connect to prover service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Prover service returned {}: {}", status, body));
        }

        let api_response: ApiResponse<ProveJob> = response
            .json()
            .await
            .context("Failed to parse prover response")?;

        match api_response {
            ApiResponse::Success { data } => Ok(data),
            ApiResponse::Error { message, code } => Err(anyhow!(
                "Prover error ({}): {}",
                code.unwrap_or_else(|| "unknown".to_string()),
                message
            )),
        }
    }

    async fn job_status(&self, job_id: &str) -> Result<ProofJobStatus> {
        let url = format!("{}/v1/withdraw/{}", self.config.url, job_id);
        let response = self.client.get(&url).send().await?;

        let api_response: ApiResponse<ProofJobStatus> = response.json().await?;
        match api_response {
            ApiResponse::Success { data } => Ok(data),
            ApiResponse::Error { message, .. } => Err(anyhow!("Status query failed: {}", message)),
        }
    }

    async fn poll_for_completion(&self, job_id: &str) -> Result<Proof> {
        let poll_timeout = self.config.proof_timeout;
        let poll_interval = self.config.poll_interval;

        timeout(poll_timeout, async {
            loop {
                match self.job_status(job_id).await {
                    Ok(status) => {
                        debug!("Job {} status: {:?}", job_id, status.state);

                        match status.state {
                            ProofJobState::Completed => {
                                let hex_proof = status
                                    .proof
                                    .ok_or_else(|| anyhow!("Completed job carries no proof"))?;
                                let bytes = hex::decode(hex_proof.trim_start_matches("0x"))
                                    .context("Invalid proof hex")?;
                                return Ok(Proof(bytes));
                            }
                            ProofJobState::Failed => {
                                return Err(anyhow!(
                                    "Proof generation failed: {}",
                                    status.error.unwrap_or_else(|| "unknown error".to_string())
                                ));
                            }
                            ProofJobState::Cancelled => {
                                return Err(anyhow!("Proof job was cancelled"));
                            }
                            ProofJobState::Pending | ProofJobState::Proving => {}
                        }
                    }
                    Err(e) => {
                        warn!("Failed to get job status: {}", e);
                    }
                }

                tokio::time::sleep(poll_interval).await;
            }
        })
        .await
        .map_err(|_| anyhow!("Proof generation timed out after {:?}", poll_timeout))?
    }
}

#[async_trait]
impl ProofBackend for HttpProofBackend {
    async fn prove(&self, inputs: &CircuitInputs) -> Result<Proof> {
        let job = self.submit(inputs).await?;
        info!("Proof job created: {}", job.job_id);
        self.set_active(Some(job.job_id.clone()));

        let proof = self.poll_for_completion(&job.job_id).await?;
        self.set_active(None);
        Ok(proof)
    }

    async fn release(&self) {
        let Some(job_id) = self.take_active() else {
            return;
        };

        let url = format!("{}/v1/withdraw/{}", self.config.url, job_id);
        match self.client.delete(&url).send().await {
            Ok(_) => info!("Cancelled unfinished proof job {}", job_id),
            Err(e) => warn!("Failed to cancel proof job {}: {}", job_id, e),
        }
    }
}
