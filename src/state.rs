//! Persisted chain state.
//!
//! Layout: every registry parameter in persisted order, little-endian, four
//! bytes each. Float parameters are stored as `f32`, toggles and choices as
//! `i32`. There is no header and no version; the length alone identifies the
//! layout. Restoring is all-or-nothing.

use thiserror::Error;

use crate::chain::VocalChain;
use crate::params::{ParamKind, ParamRegistry, PARAM_COUNT};

const VALUE_BYTES: usize = 4;
pub const STATE_LEN: usize = PARAM_COUNT * VALUE_BYTES;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("state truncated: expected {expected} bytes, got {found}")]
    Truncated { expected: usize, found: usize },
    #[error("state has {extra} trailing bytes")]
    TrailingBytes { extra: usize },
    #[error("invalid value {value} for '{key}'")]
    InvalidFlag { key: &'static str, value: i32 },
    #[error("non-finite value for '{key}'")]
    NonFinite { key: &'static str },
}

impl VocalChain {
    /// Serialize every parameter value.
    pub fn save_state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(STATE_LEN);
        for spec in ParamRegistry::global().iter() {
            let v = self.value(spec.id);
            if spec.kind.is_discrete() {
                out.extend_from_slice(&(v.round() as i32).to_le_bytes());
            } else {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }

    /// Restore values written by `save_state`. On error nothing changes.
    pub fn restore_state(&mut self, bytes: &[u8]) -> Result<(), StateError> {
        let values = decode(bytes).map_err(|e| {
            log::warn!("rejecting saved state: {e}");
            e
        })?;
        let registry = ParamRegistry::global();
        for (spec, &v) in registry.iter().zip(values.iter()) {
            self.write_value(spec, v);
        }
        log::debug!("restored {} parameters", registry.len());
        Ok(())
    }
}

/// Validate and decode a whole state blob before anything is applied.
fn decode(bytes: &[u8]) -> Result<[f32; PARAM_COUNT], StateError> {
    if bytes.len() < STATE_LEN {
        return Err(StateError::Truncated {
            expected: STATE_LEN,
            found: bytes.len(),
        });
    }
    if bytes.len() > STATE_LEN {
        return Err(StateError::TrailingBytes {
            extra: bytes.len() - STATE_LEN,
        });
    }

    let mut values = [0.0f32; PARAM_COUNT];
    for ((spec, chunk), slot) in ParamRegistry::global()
        .iter()
        .zip(bytes.chunks_exact(VALUE_BYTES))
        .zip(values.iter_mut())
    {
        let raw = [chunk[0], chunk[1], chunk[2], chunk[3]];
        *slot = match spec.kind {
            ParamKind::Float { .. } => {
                let v = f32::from_le_bytes(raw);
                if !v.is_finite() {
                    return Err(StateError::NonFinite { key: spec.key });
                }
                v
            }
            ParamKind::Toggle { .. } => match i32::from_le_bytes(raw) {
                v @ (0 | 1) => v as f32,
                value => return Err(StateError::InvalidFlag { key: spec.key, value }),
            },
            ParamKind::Choice { count, .. } => {
                let v = i32::from_le_bytes(raw);
                if v < 0 || v as u32 >= count {
                    return Err(StateError::InvalidFlag { key: spec.key, value: v });
                }
                v as f32
            }
        };
    }
    Ok(values)
}
