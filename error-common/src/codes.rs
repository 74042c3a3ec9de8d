// Error codes implementation
// Standardized error codes shared by the clinical inference crates

pub mod configuration {
    pub const INVALID_VALUE: &str = "CONFIG_6001";
}

pub mod inference {
    /// Role has no model descriptor; permanent until configuration changes
    pub const MODEL_NOT_FOUND: &str = "INFER_5001";
    /// Required runtime or artifact missing
    pub const BACKEND_UNAVAILABLE: &str = "INFER_5002";
    /// Transient failure while loading or running a model
    pub const RUNTIME_FAILURE: &str = "INFER_5003";
    /// Every audio decoding backend failed
    pub const AUDIO_DECODE_FAILURE: &str = "INFER_5004";
    /// Every transcription strategy failed
    pub const TRANSCRIPTION_EXHAUSTED: &str = "INFER_5005";
}

pub mod system {
    pub const IO_FAILURE: &str = "SYS_7001";
    pub const INTERNAL: &str = "SYS_7002";
}
