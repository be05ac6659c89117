//! Compute device detection.
//!
//! Detection runs once, when the generator is built, and the resulting
//! [`DeviceProfile`] is never touched again. Picking a different device means
//! restarting the process.

use std::process::Command;

use serde::Serialize;
use tracing::{debug, info};

/// Accelerators with less memory than this run the model on the CPU instead.
pub const HALF_PRECISION_MIN_MEMORY_BYTES: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    Cpu,
    Cuda,
    /// Apple-silicon Metal Performance Shaders.
    Mps,
}

impl ComputeBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeBackend::Cpu => "cpu",
            ComputeBackend::Cuda => "cuda",
            ComputeBackend::Mps => "mps",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Full,
    Half,
}

impl Precision {
    /// Floating point dtype name as understood by the model runtime.
    pub fn dtype(&self) -> &'static str {
        match self {
            Precision::Full => "float32",
            Precision::Half => "float16",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceleratorInfo {
    pub name: String,
    pub total_memory_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub cpu_count: usize,
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    pub backend: ComputeBackend,
    pub precision: Precision,
    pub cache_enabled: bool,
    /// Present whenever a CUDA device was seen, even if it was not selected.
    pub accelerator: Option<AcceleratorInfo>,
    pub host: HostInfo,
}

impl DeviceProfile {
    /// Plain CPU profile at full precision.
    pub fn cpu(cache_enabled: bool) -> Self {
        Self {
            backend: ComputeBackend::Cpu,
            precision: Precision::Full,
            cache_enabled,
            accelerator: None,
            host: HostInfo::default(),
        }
    }

    pub(crate) fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }
}

/// Source of hardware facts used by [`detect`].
pub trait ComputeProbe {
    /// First CUDA device, if any.
    fn cuda(&self) -> Option<AcceleratorInfo>;
    fn mps_available(&self) -> bool;
    fn host(&self) -> HostInfo;
}

/// Probe backed by the real machine: `nvidia-smi` for CUDA, the target
/// triple for MPS and `sysinfo` for host memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ComputeProbe for SystemProbe {
    fn cuda(&self) -> Option<AcceleratorInfo> {
        let smi = which::which("nvidia-smi").ok()?;
        let output = Command::new(smi)
            .args(["--query-gpu=name,memory.total", "--format=csv,noheader,nounits"])
            .output()
            .ok()?;
        if !output.status.success() {
            debug!("nvidia-smi exited with {}", output.status);
            return None;
        }
        parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
    }

    fn mps_available(&self) -> bool {
        cfg!(all(target_os = "macos", target_arch = "aarch64"))
    }

    fn host(&self) -> HostInfo {
        let mut system = sysinfo::System::new();
        system.refresh_cpu();
        system.refresh_memory();
        HostInfo {
            cpu_count: system.cpus().len(),
            total_memory_bytes: system.total_memory(),
            available_memory_bytes: system.available_memory(),
        }
    }
}

/// Parse the first line of `nvidia-smi --query-gpu=name,memory.total
/// --format=csv,noheader,nounits` (memory is reported in MiB).
pub fn parse_nvidia_smi(output: &str) -> Option<AcceleratorInfo> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (name, memory) = line.rsplit_once(',')?;
    let mib: u64 = memory.trim().parse().ok()?;
    Some(AcceleratorInfo {
        name: name.trim().to_string(),
        total_memory_bytes: mib * 1024 * 1024,
    })
}

/// Pick a backend and precision.
///
/// CUDA with enough memory runs at half precision. A CUDA device below
/// [`HALF_PRECISION_MIN_MEMORY_BYTES`] is skipped in favour of the CPU, not
/// tried at full precision. MPS has no half precision path.
pub fn detect(probe: &dyn ComputeProbe, cache_enabled: bool) -> DeviceProfile {
    let host = probe.host();
    let accelerator = probe.cuda();

    let (backend, precision) = match &accelerator {
        Some(gpu) if gpu.total_memory_bytes >= HALF_PRECISION_MIN_MEMORY_BYTES => {
            (ComputeBackend::Cuda, Precision::Half)
        }
        Some(_) => (ComputeBackend::Cpu, Precision::Full),
        None if probe.mps_available() => (ComputeBackend::Mps, Precision::Full),
        None => (ComputeBackend::Cpu, Precision::Full),
    };

    match &accelerator {
        Some(gpu) => info!(
            backend = backend.as_str(),
            precision = precision.dtype(),
            gpu = %gpu.name,
            gpu_memory_gb = gpu.total_memory_bytes as f64 / 1024f64.powi(3),
            "compute device selected"
        ),
        None => info!(
            backend = backend.as_str(),
            precision = precision.dtype(),
            cpus = host.cpu_count,
            host_memory_mb = host.total_memory_bytes / 1024 / 1024,
            "compute device selected"
        ),
    }

    DeviceProfile {
        backend,
        precision,
        cache_enabled,
        accelerator,
        host,
    }
}
