//! wgpu execution backend.
//!
//! A function is executed by appending a small compute kernel to the
//! composed module source. The kernel reads the arguments from a storage
//! buffer of 32-bit words, calls the function once, and writes the result
//! words to a second storage buffer that is then read back.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::device::DeviceParameters;
use crate::error::{BridgeError, Result};
use crate::shader::CompiledShader;
use crate::signature::Signature;
use crate::types::{ScalarType, ShaderType};
use crate::value::{Scalar, Value};

use super::{BackendType, ExecutionBackend};

const KERNEL_ENTRY: &str = "shadercall_main";

/// wgpu-based execution backend.
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("instance", &self.instance)
            .field("adapter", &self.adapter.get_info().name)
            .finish()
    }
}

impl WgpuBackend {
    /// Create a new wgpu backend.
    pub fn with_params(params: &DeviceParameters) -> Result<Self> {
        let flags = if params.validation {
            wgpu::InstanceFlags::debugging()
        } else {
            wgpu::InstanceFlags::empty()
        };

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags,
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| BridgeError::InitializationFailed(format!("No compatible GPU adapter: {e}")))?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("shadercall Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| BridgeError::InitializationFailed(format!("Device creation failed: {e}")))?;

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Read `size` bytes of `buffer` through a staging copy.
    fn read_buffer(&self, buffer: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Result Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Result Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        let idx = self.queue.submit(std::iter::once(encoder.finish()));

        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(idx),
            timeout: Some(std::time::Duration::from_secs(10)),
        });

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        let readback_failed = |e: &dyn std::fmt::Display| {
            BridgeError::Execution(format!("result readback failed: {e}"))
        };
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(readback_failed(&e)),
            Err(e) => return Err(readback_failed(&e)),
        }

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }
}

impl ExecutionBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn kind(&self) -> BackendType {
        BackendType::Wgpu
    }

    fn execute(
        &self,
        shader: &CompiledShader,
        signature: &Signature,
        arguments: &[Value],
    ) -> Result<Value> {
        let return_scalar = signature.return_type().scalar().ok_or_else(|| {
            BridgeError::Execution(format!(
                "`{}` returns {}, which cannot be read back",
                signature.name(),
                signature.return_type()
            ))
        })?;

        let group = kernel_group(&shader.module);
        let max_groups = self.device.limits().max_bind_groups;
        if group >= max_groups {
            return Err(BridgeError::Execution(format!(
                "module uses bind group {} and the device supports only {max_groups}",
                group.saturating_sub(1)
            )));
        }

        let kernel = kernel_source(signature, group)?;
        log::trace!("WgpuBackend kernel for `{}`:\n{kernel}", signature.name());

        let words: Vec<u32> = arguments
            .iter()
            .flat_map(|value| value.components().iter().map(Scalar::to_bits))
            .collect();
        let result_size = (signature.return_type().word_count() * 4) as u64;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(signature.name()),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(format!(
                    "{}\n{kernel}",
                    shader.source
                ))),
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("shadercall Pipeline"),
                layout: None,
                module: &module,
                entry_point: Some(KERNEL_ENTRY),
                compilation_options: Default::default(),
                cache: None,
            });

        let args_buffer = (!words.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Argument Buffer"),
                    contents: bytemuck::cast_slice(&words),
                    usage: wgpu::BufferUsages::STORAGE,
                })
        });
        let result_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Result Buffer"),
            size: result_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let mut entries = Vec::with_capacity(2);
        if let Some(args_buffer) = &args_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: args_buffer.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: 1,
            resource: result_buffer.as_entire_binding(),
        });

        // Groups below the kernel's are empty in the derived layout but still need a bind group.
        let empty_groups: Vec<wgpu::BindGroup> = (0..group)
            .map(|index| {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: None,
                    layout: &pipeline.get_bind_group_layout(index),
                    entries: &[],
                })
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadercall Bind Group"),
            layout: &pipeline.get_bind_group_layout(group),
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("shadercall Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("shadercall Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            for (index, empty) in empty_groups.iter().enumerate() {
                pass.set_bind_group(index as u32, empty, &[]);
            }
            pass.set_bind_group(group, &bind_group, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BridgeError::Execution(format!(
                "GPU validation failed for `{}`: {error}",
                signature.name()
            )));
        }

        let bytes = self.read_buffer(&result_buffer, result_size)?;
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<u32>)
            .collect();

        decode_result(signature.return_type(), return_scalar, &words)
    }
}

/// Bind group index for the kernel's buffers: one past the highest group
/// the module already uses.
fn kernel_group(module: &naga::Module) -> u32 {
    module
        .global_variables
        .iter()
        .filter_map(|(_, global)| global.binding.as_ref().map(|b| b.group + 1))
        .max()
        .unwrap_or(0)
}

fn decode_result(ty: &ShaderType, scalar: ScalarType, words: &[u32]) -> Result<Value> {
    if words.len() < ty.word_count() {
        return Err(BridgeError::Execution(format!(
            "expected {} result words, read {}",
            ty.word_count(),
            words.len()
        )));
    }
    match ty {
        ShaderType::Scalar(_) => Ok(Value::Scalar(Scalar::from_bits(scalar, words[0]))),
        ShaderType::Vector { size, .. } => Ok(Value::Vector(
            words[..*size as usize]
                .iter()
                .map(|bits| Scalar::from_bits(scalar, *bits))
                .collect(),
        )),
        ShaderType::Opaque(name) => Err(BridgeError::Execution(format!(
            "cannot read back a value of type {name}"
        ))),
    }
}

/// WGSL expression turning the argument word at `index` into a `scalar`.
fn read_word(scalar: ScalarType, index: usize) -> String {
    let word = format!("shadercall_args[{index}]");
    match scalar {
        ScalarType::Bool => format!("({word} != 0u)"),
        ScalarType::I32 => format!("bitcast<i32>({word})"),
        ScalarType::U32 => word,
        ScalarType::F32 => format!("bitcast<f32>({word})"),
    }
}

/// WGSL expression turning a `scalar` expression into a `u32` word.
fn write_word(scalar: ScalarType, expr: &str) -> String {
    match scalar {
        ScalarType::Bool => format!("select(0u, 1u, {expr})"),
        ScalarType::I32 | ScalarType::F32 => format!("bitcast<u32>({expr})"),
        ScalarType::U32 => expr.to_string(),
    }
}

/// Generate the compute kernel that calls `signature` once.
pub(crate) fn kernel_source(signature: &Signature, group: u32) -> Result<String> {
    let mut arguments = Vec::with_capacity(signature.parameters().len());
    let mut offset = 0;
    for param in signature.parameters() {
        let expr = match &param.ty {
            ShaderType::Scalar(scalar) => read_word(*scalar, offset),
            ShaderType::Vector { size, scalar } => {
                let components: Vec<String> = (0..*size as usize)
                    .map(|i| read_word(*scalar, offset + i))
                    .collect();
                format!("vec{size}<{scalar}>({})", components.join(", "))
            }
            ShaderType::Opaque(name) => {
                return Err(BridgeError::Execution(format!(
                    "parameter `{}` has type {name}, which cannot be passed in",
                    param.name
                )));
            }
        };
        offset += param.ty.word_count();
        arguments.push(expr);
    }

    let mut src = String::new();
    let _ = writeln!(src);
    if offset > 0 {
        let _ = writeln!(
            src,
            "@group({group}) @binding(0) var<storage, read> shadercall_args: array<u32>;"
        );
    }
    let _ = writeln!(
        src,
        "@group({group}) @binding(1) var<storage, read_write> shadercall_result: array<u32>;"
    );
    let _ = writeln!(src);
    let _ = writeln!(src, "@compute @workgroup_size(1)");
    let _ = writeln!(src, "fn {KERNEL_ENTRY}() {{");
    let _ = writeln!(
        src,
        "    let shadercall_value = {}({});",
        signature.name(),
        arguments.join(", ")
    );
    match signature.return_type() {
        ShaderType::Scalar(scalar) => {
            let _ = writeln!(
                src,
                "    shadercall_result[0] = {};",
                write_word(*scalar, "shadercall_value")
            );
        }
        ShaderType::Vector { size, scalar } => {
            for i in 0..*size {
                let component = format!("shadercall_value[{i}]");
                let _ = writeln!(
                    src,
                    "    shadercall_result[{i}] = {};",
                    write_word(*scalar, &component)
                );
            }
        }
        ShaderType::Opaque(name) => {
            return Err(BridgeError::Execution(format!(
                "`{}` returns {name}, which cannot be read back",
                signature.name()
            )));
        }
    }
    let _ = writeln!(src, "}}");
    Ok(src)
}
