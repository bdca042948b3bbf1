//! ONNX Runtime backend. Input: [1, MODEL_INPUT_DIM] f32, output: raw score.
//! Load errors surface to the detector, which falls back to rule-based.

use super::{model_input, MODEL_INPUT_DIM};
use crate::features::FeatureSet;
use ndarray::Array2;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

static ORT_ENV: OnceLock<ort::Environment> = OnceLock::new();

fn init_env() -> &'static ort::Environment {
    ORT_ENV.get_or_init(|| {
        ort::Environment::builder()
            .with_name("voltwatch")
            .build()
            .expect("ORT environment")
    })
}

pub struct OnnxScorer {
    session: ort::Session,
    input_name: String,
}

impl OnnxScorer {
    /// Load model from path; logs the artifact checksum on success.
    pub fn load(path: &Path) -> Result<Self, BoxError> {
        let _env = init_env();
        if !path.exists() {
            return Err(format!("model file not found: {}", path.display()).into());
        }

        let session = ort::Session::builder()?.commit_from_file(path)?;
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        if let Some(checksum) = checksum_file(path) {
            info!(path = %path.display(), sha256 = %checksum, "model artifact loaded");
        }

        Ok(Self {
            session,
            input_name,
        })
    }

    /// Run inference over the fixed feature vector; raw output, unclamped.
    pub fn score(&self, features: &FeatureSet) -> Result<f64, BoxError> {
        let input = model_input(features);
        let arr = Array2::from_shape_vec((1, MODEL_INPUT_DIM), input.to_vec())?;
        let value = ort::Value::from_array(arr.into_dyn())?;

        let outputs = self.session.run(ort::inputs![self.input_name.as_str() => value]?)?;
        let out = outputs.get(0).ok_or("model produced no outputs")?;
        let view = out.try_extract_raw_tensor::<f32>()?;
        let raw = view
            .as_slice()
            .first()
            .copied()
            .ok_or("model produced an empty output tensor")?;
        Ok(raw as f64)
    }
}

fn checksum_file(path: &Path) -> Option<String> {
    let data = std::fs::read(path).ok()?;
    let mut h = Sha256::new();
    h.update(&data);
    Some(format!("{:x}", h.finalize()))
}
