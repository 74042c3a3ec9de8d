//! Text models on candle
//!
//! Quantized GGUF files load through `quantized_llama`; package
//! directories with a Gemma `config.json` load from safetensors. Speech
//! packages are reported as unavailable so the transcription ladder
//! degrades instead of guessing at an architecture.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::{gemma, quantized_llama};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{CausalLm, ComputeDevice, HfTokenizer, LmSession, LoadedModelHandle, ModelLoader};
use crate::error::{InferenceError, InferenceResult};
use crate::registry::{ArtifactKind, ModelDescriptor};

/// Used when a GGUF file does not record its context length
const DEFAULT_CONTEXT_WINDOW: usize = 8192;

fn runtime_err(context: &str) -> impl Fn(candle_core::Error) -> InferenceError + '_ {
    move |e| InferenceError::Runtime(format!("{context}: {e}"))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CandleLoader;

impl CandleLoader {
    fn device(device: ComputeDevice) -> InferenceResult<Device> {
        match device {
            ComputeDevice::Cuda(ordinal) => Device::new_cuda(ordinal).map_err(runtime_err("CUDA device")),
            ComputeDevice::Metal(ordinal) => Device::new_metal(ordinal).map_err(runtime_err("Metal device")),
            ComputeDevice::Cpu => Ok(Device::Cpu),
        }
    }
}

impl ModelLoader for CandleLoader {
    fn select_device(&self) -> ComputeDevice {
        if candle_core::utils::cuda_is_available() {
            ComputeDevice::Cuda(0)
        } else if candle_core::utils::metal_is_available() {
            ComputeDevice::Metal(0)
        } else {
            ComputeDevice::Cpu
        }
    }

    fn load(&self, descriptor: &ModelDescriptor, device: ComputeDevice) -> InferenceResult<LoadedModelHandle> {
        let candle_device = Self::device(device)?;
        let tokenizer = HfTokenizer::for_artifact(&descriptor.location, descriptor.artifact_kind)?;
        let eos = tokenizer.eos_ids();

        let lm = match descriptor.artifact_kind {
            ArtifactKind::QuantizedFile => CandleLm::from_gguf(&descriptor.location, candle_device, eos)?,
            ArtifactKind::DirectoryPackage => CandleLm::from_gemma_dir(&descriptor.location, candle_device, eos)?,
        };
        info!(
            role = %descriptor.role,
            context_window = lm.context_window,
            "Text model ready"
        );

        Ok(LoadedModelHandle::text(
            descriptor.location.clone(),
            device,
            Arc::new(tokenizer),
            Arc::new(lm),
        ))
    }
}

enum Backbone {
    Quantized(quantized_llama::ModelWeights),
    Gemma(gemma::Model),
}

impl Backbone {
    fn forward(&mut self, input: &Tensor, position: usize) -> candle_core::Result<Tensor> {
        match self {
            Backbone::Quantized(model) => model.forward(input, position),
            Backbone::Gemma(model) => model.forward(input, position),
        }
    }

    fn reset(&mut self) {
        match self {
            // Position zero resets the quantized KV cache
            Backbone::Quantized(_) => {}
            Backbone::Gemma(model) => model.clear_kv_cache(),
        }
    }
}

pub struct CandleLm {
    backbone: Mutex<Backbone>,
    device: Device,
    context_window: usize,
    eos: Vec<u32>,
}

impl CandleLm {
    fn from_gguf(path: &Path, device: Device, eos: Vec<u32>) -> InferenceResult<Self> {
        let mut file = File::open(path)?;
        let content = gguf_file::Content::read(&mut file).map_err(runtime_err("GGUF header"))?;

        let context_window = content
            .metadata
            .get("general.architecture")
            .and_then(|arch| arch.to_string().ok())
            .and_then(|arch| content.metadata.get(&format!("{arch}.context_length")))
            .and_then(|value| value.to_u32().ok())
            .map_or(DEFAULT_CONTEXT_WINDOW, |n| n as usize);

        let weights = quantized_llama::ModelWeights::from_gguf(content, &mut file, &device)
            .map_err(runtime_err("GGUF weights"))?;

        Ok(Self {
            backbone: Mutex::new(Backbone::Quantized(weights)),
            device,
            context_window,
            eos,
        })
    }

    fn from_gemma_dir(dir: &Path, device: Device, eos: Vec<u32>) -> InferenceResult<Self> {
        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(dir.join("config.json"))?)?;
        let is_ctc = raw
            .get("architectures")
            .and_then(|a| a.as_array())
            .is_some_and(|archs| archs.iter().filter_map(|a| a.as_str()).any(|a| a.ends_with("ForCTC")));
        if is_ctc {
            return Err(InferenceError::BackendUnavailable(format!(
                "{} is a CTC speech package; no native speech runtime is available",
                dir.display()
            )));
        }

        let config: gemma::Config = serde_json::from_value(raw)?;
        let shards = safetensor_shards(dir)?;
        debug!(shards = shards.len(), "Mapping safetensors");

        let dtype = if device.is_cuda() { DType::BF16 } else { DType::F32 };
        // The mapped files must not change while the model is alive
        #[allow(unsafe_code)]
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&shards, dtype, &device) }
            .map_err(runtime_err("safetensors"))?;
        let model = gemma::Model::new(false, &config, vb).map_err(runtime_err("Gemma weights"))?;

        Ok(Self {
            backbone: Mutex::new(Backbone::Gemma(model)),
            device,
            context_window: config.max_position_embeddings,
            eos,
        })
    }
}

fn safetensor_shards(dir: &Path) -> InferenceResult<Vec<PathBuf>> {
    let single = dir.join("model.safetensors");
    if single.is_file() {
        return Ok(vec![single]);
    }

    let index: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.join("model.safetensors.index.json"))?)?;
    let mut files: Vec<String> = index
        .get("weight_map")
        .and_then(|m| m.as_object())
        .map(|map| map.values().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    files.sort();
    files.dedup();

    if files.is_empty() {
        return Err(InferenceError::Runtime(format!(
            "no safetensors weights in {}",
            dir.display()
        )));
    }
    Ok(files.into_iter().map(|f| dir.join(f)).collect())
}

impl CausalLm for CandleLm {
    fn context_window(&self) -> usize {
        self.context_window
    }

    fn eos_token_ids(&self) -> &[u32] {
        &self.eos
    }

    fn session(&self) -> InferenceResult<Box<dyn LmSession + '_>> {
        let mut backbone = self.backbone.lock();
        backbone.reset();
        Ok(Box::new(CandleSession {
            backbone,
            device: &self.device,
            position: 0,
        }))
    }
}

/// Holds the model lock for the whole request
struct CandleSession<'a> {
    backbone: MutexGuard<'a, Backbone>,
    device: &'a Device,
    position: usize,
}

impl LmSession for CandleSession<'_> {
    fn forward(&mut self, ids: &[u32]) -> InferenceResult<Vec<f32>> {
        let input = Tensor::new(ids, self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(runtime_err("input tensor"))?;
        let logits = self
            .backbone
            .forward(&input, self.position)
            .map_err(runtime_err("forward pass"))?;
        self.position += ids.len();

        logits
            .flatten_all()
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(runtime_err("logits"))
    }
}
