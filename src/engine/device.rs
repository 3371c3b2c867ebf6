// Copyright 2024-2026 SCAudit Contributors
// SPDX-License-Identifier: Apache-2.0

//! Compute device selection.
//!
//! The serving device is resolved once when the server is built and never
//! changes afterwards. Accelerators that fail to initialize fall back to CPU.

use std::fmt;
use std::str::FromStr;

use candle_core::Device;

use super::error::InferenceError;

/// Requested placement, as read from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DevicePreference {
    /// Use an accelerator when one is available.
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "metal" | "mps" => Ok(Self::Metal),
            other => Err(format!("unknown device '{}'", other)),
        }
    }
}

/// Resolved device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
}

impl DeviceKind {
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Cuda => write!(f, "cuda"),
            DeviceKind::Metal => write!(f, "metal"),
        }
    }
}

/// The device a model server binds its models to.
#[derive(Debug, Clone)]
pub struct ServeDevice {
    kind: DeviceKind,
    ordinal: usize,
    device: Device,
}

impl ServeDevice {
    /// Host CPU device.
    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            ordinal: 0,
            device: Device::Cpu,
        }
    }

    /// Resolve a preference to a concrete device. Never fails: an accelerator
    /// that cannot be opened degrades to CPU with a warning.
    pub fn resolve(preference: DevicePreference) -> Self {
        match preference {
            DevicePreference::Cpu => Self::cpu(),
            DevicePreference::Cuda => Self::open_cuda(0).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "CUDA requested but unavailable, using CPU");
                Self::cpu()
            }),
            DevicePreference::Metal => Self::open_metal(0).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Metal requested but unavailable, using CPU");
                Self::cpu()
            }),
            DevicePreference::Auto => {
                if candle_core::utils::cuda_is_available() {
                    if let Ok(dev) = Self::open_cuda(0) {
                        return dev;
                    }
                }
                if candle_core::utils::metal_is_available() {
                    if let Ok(dev) = Self::open_metal(0) {
                        return dev;
                    }
                }
                Self::cpu()
            }
        }
    }

    fn open_cuda(ordinal: usize) -> Result<Self, InferenceError> {
        let device =
            Device::new_cuda(ordinal).map_err(|e| InferenceError::Device(e.to_string()))?;
        Ok(Self { kind: DeviceKind::Cuda, ordinal, device })
    }

    fn open_metal(ordinal: usize) -> Result<Self, InferenceError> {
        let device =
            Device::new_metal(ordinal).map_err(|e| InferenceError::Device(e.to_string()))?;
        Ok(Self { kind: DeviceKind::Metal, ordinal, device })
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Candle device handle for tensor placement.
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn is_accelerator(&self) -> bool {
        self.kind.is_accelerator()
    }

    /// Wait for queued device work so that freed buffers are returned to the
    /// allocator before the next model is installed.
    pub fn synchronize(&self) -> Result<(), InferenceError> {
        if !self.is_accelerator() {
            return Ok(());
        }
        self.device
            .synchronize()
            .map_err(|e| InferenceError::Device(e.to_string()))
    }
}

impl PartialEq for ServeDevice {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.ordinal == other.ordinal
    }
}

impl fmt::Display for ServeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}
