//! Resource limits for the codec.
//!
//! Builder-pattern config, same shape as `ServerConfig` in the RTMP server
//! this crate grew out of: `Default` plus chainable setters.

/// Caps that protect the decoder from malicious or malformed length fields.
#[derive(Debug, Clone)]
pub struct CodecLimits {
    /// Upper bound on how many entries a single array/dict preallocates
    /// before it has actually consumed that many elements from the stream.
    pub max_collection_prealloc: usize,

    /// Upper bound on a single encode invocation's output buffer.
    pub max_output_buffer: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_collection_prealloc: 100_000,
            max_output_buffer: 10 * 1024 * 1024,
        }
    }
}

impl CodecLimits {
    pub fn with_max_collection_prealloc(mut self, max: usize) -> Self {
        self.max_collection_prealloc = max;
        self
    }

    pub fn with_max_output_buffer(mut self, max: usize) -> Self {
        self.max_output_buffer = max;
        self
    }
}
