//! Face similarity decisions.
//!
//! The actual face detection and embedding work is done by an external
//! similarity oracle; this module wraps the oracle's raw readings in the
//! match decision rule. `score = 1 - distance`, and a sample matches iff
//! `distance <= tolerance`. Exactly one face must be present in the sample.

use crate::APP_USER_AGENT;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default maximum dissimilarity distance for a sample to count as a match.
pub const DEFAULT_TOLERANCE: f64 = 0.6;

/// Raw similarity reading: how many faces were found in the sample and the
/// dissimilarity distance to the template (smaller = more similar). The
/// distance is only meaningful when exactly one face was found.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FaceScan {
    pub faces: usize,
    pub distance: f64,
}

/// Template extraction reading for enrollment. The template is present iff
/// exactly one face was found.
#[derive(Clone, Debug)]
pub struct EnrollScan {
    pub faces: usize,
    pub template: Option<Vec<u8>>,
}

/// External face-similarity collaborator.
#[async_trait]
pub trait FaceOracle: Send + Sync {
    /// Compare a stored template against a live sample.
    async fn scan(&self, template: &[u8], sample: &[u8]) -> Result<FaceScan>;

    /// Extract a reference template from an enrollment sample.
    async fn enroll(&self, sample: &[u8]) -> Result<EnrollScan>;
}

/// Decision on a login sample.
#[derive(Clone, Debug, PartialEq)]
pub enum MatchResult {
    NoFaceDetected,
    MultipleFacesDetected,
    Matched { score: f64 },
    NotMatched { score: f64 },
    OracleError { reason: String },
}

impl MatchResult {
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Matched { score } | Self::NotMatched { score } => Some(*score),
            _ => None,
        }
    }
}

/// Decision on an enrollment sample.
#[derive(Clone, Debug, PartialEq)]
pub enum EnrollResult {
    Enrolled { template: Vec<u8> },
    NoFaceDetected,
    MultipleFacesDetected,
    OracleError { reason: String },
}

impl EnrollResult {
    /// User-facing message for enrollment problems.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Enrolled { .. } => None,
            Self::NoFaceDetected => Some("No face detected in the image. Please try again."),
            Self::MultipleFacesDetected => {
                Some("Multiple faces detected. Please provide an image with only your face.")
            }
            Self::OracleError { reason } => Some(reason),
        }
    }
}

/// Stateless decision layer over a [`FaceOracle`]. The template is supplied
/// by the caller, never fetched here.
#[derive(Clone)]
pub struct FaceMatcher {
    oracle: Arc<dyn FaceOracle>,
    tolerance: f64,
}

impl FaceMatcher {
    #[must_use]
    pub fn new(oracle: Arc<dyn FaceOracle>, tolerance: f64) -> Self {
        Self {
            oracle,
            tolerance: tolerance.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub async fn match_sample(&self, template: &[u8], sample: &[u8]) -> MatchResult {
        let scan = match self.oracle.scan(template, sample).await {
            Ok(scan) => scan,
            Err(err) => {
                return MatchResult::OracleError {
                    reason: err.to_string(),
                }
            }
        };

        if scan.faces == 0 {
            return MatchResult::NoFaceDetected;
        }
        if scan.faces > 1 {
            return MatchResult::MultipleFacesDetected;
        }

        let score = 1.0 - scan.distance;
        if scan.distance <= self.tolerance {
            MatchResult::Matched { score }
        } else {
            MatchResult::NotMatched { score }
        }
    }

    pub async fn enroll(&self, sample: &[u8]) -> EnrollResult {
        let scan = match self.oracle.enroll(sample).await {
            Ok(scan) => scan,
            Err(err) => {
                return EnrollResult::OracleError {
                    reason: err.to_string(),
                }
            }
        };

        if scan.faces == 0 {
            return EnrollResult::NoFaceDetected;
        }
        if scan.faces > 1 {
            return EnrollResult::MultipleFacesDetected;
        }

        match scan.template {
            Some(template) => EnrollResult::Enrolled { template },
            None => EnrollResult::OracleError {
                reason: "oracle reported one face but returned no template".to_string(),
            },
        }
    }
}

/// HTTP client for a face-similarity service exposing `/compare` and
/// `/enroll`. Blobs travel base64-encoded.
pub struct HttpFaceOracle {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct CompareRequest<'a> {
    template: &'a str,
    sample: &'a str,
}

#[derive(Serialize)]
struct EnrollRequest<'a> {
    sample: &'a str,
}

#[derive(Deserialize)]
struct EnrollResponse {
    faces: usize,
    template: Option<String>,
}

impl HttpFaceOracle {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build face oracle client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FaceOracle for HttpFaceOracle {
    async fn scan(&self, template: &[u8], sample: &[u8]) -> Result<FaceScan> {
        let template = STANDARD.encode(template);
        let sample = STANDARD.encode(sample);
        let request = CompareRequest {
            template: &template,
            sample: &sample,
        };

        let response = self
            .client
            .post(format!("{}/compare", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Face oracle is unreachable")?;

        if !response.status().is_success() {
            bail!("Face oracle returned {}", response.status());
        }

        response
            .json::<FaceScan>()
            .await
            .context("Invalid face oracle response")
    }

    async fn enroll(&self, sample: &[u8]) -> Result<EnrollScan> {
        let sample = STANDARD.encode(sample);
        let request = EnrollRequest { sample: &sample };

        let response = self
            .client
            .post(format!("{}/enroll", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Face oracle is unreachable")?;

        if !response.status().is_success() {
            bail!("Face oracle returned {}", response.status());
        }

        let body = response
            .json::<EnrollResponse>()
            .await
            .context("Invalid face oracle response")?;

        let template = body
            .template
            .map(|encoded| STANDARD.decode(encoded))
            .transpose()
            .context("Face oracle returned an invalid template encoding")?;

        Ok(EnrollScan {
            faces: body.faces,
            template,
        })
    }
}
