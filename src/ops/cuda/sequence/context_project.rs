//! Context projection CUDA launchers
//!
//! Descriptors are built on the host against raw device addresses, packed into
//! one device block (five host-to-device copies) and consumed by a single
//! fused launch covering every segment. Padding fill and padding-gradient
//! accumulation run per span on the client stream.

use std::ffi::c_void;

use crate::error::{Error, Result};
use crate::ops::impl_generic::context::projector::{
    check_f32_matrix, check_len, check_padding_shape,
};
use crate::ops::impl_generic::context::{
    ContextPlan, ContextProjectConfig, ContextWindow, MetadataLayout, PaddingPlan, RowAddressing,
    SegmentArrays, WindowLaunch, check_boundary,
};
use crate::ops::cuda::kernels::{
    self, COLUMNIZE_F32, CONTEXT_WINDOW_MODULE, DECOLUMNIZE_F32, ROW_AXPY_F32,
};
use crate::ops::traits::ContextProjectOps;
use cudarc::driver::PushKernelArg;
use cudarc::driver::safe::LaunchConfig;
use cudarc::driver::sys;
use numr::dtype::DType;
use numr::runtime::Device;
use numr::runtime::cuda::{CudaClient, CudaRuntime};
use numr::tensor::Tensor;

const F32_BYTES: usize = std::mem::size_of::<f32>();
const BLOCK_SIZE: u32 = 256;
const MAX_GRID_Y: usize = 65_535;

/// Packed metadata block in device memory, freed on drop.
struct DeviceMetadata {
    ptr: sys::CUdeviceptr,
    layout: MetadataLayout,
}

impl DeviceMetadata {
    /// One allocation, then one transfer per array.
    fn upload(arrays: &SegmentArrays) -> Result<Self> {
        let layout = MetadataLayout::new(arrays.segments());
        let bytes = layout.bytes();
        let mut ptr: sys::CUdeviceptr = 0;
        unsafe {
            let result = sys::cuMemAlloc_v2(&mut ptr, bytes);
            if result != sys::CUresult::CUDA_SUCCESS {
                return Err(Error::AllocationFailed {
                    bytes,
                    reason: format!("cuMemAlloc_v2 failed: {:?}", result),
                });
            }
        }
        let block = Self { ptr, layout };
        block.copy_in(layout.input_heights_offset(), &arrays.input_heights)?;
        block.copy_in(layout.output_heights_offset(), &arrays.output_heights)?;
        block.copy_in(layout.boundary_offset(), &arrays.boundary)?;
        block.copy_in(layout.input_addrs_offset(), &arrays.input_addrs)?;
        block.copy_in(layout.output_addrs_offset(), &arrays.output_addrs)?;
        Ok(block)
    }

    fn copy_in<T: Copy>(&self, byte_offset: usize, data: &[T]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::size_of_val(data);
        debug_assert!(byte_offset + bytes <= self.layout.bytes());
        unsafe {
            let result = sys::cuMemcpyHtoD_v2(
                self.ptr + byte_offset as u64,
                data.as_ptr() as *const c_void,
                bytes,
            );
            if result != sys::CUresult::CUDA_SUCCESS {
                return Err(Error::KernelError {
                    reason: format!("metadata cuMemcpyHtoD_v2 failed: {:?}", result),
                });
            }
        }
        Ok(())
    }
}

impl Drop for DeviceMetadata {
    fn drop(&mut self) {
        unsafe {
            let _ = sys::cuMemFree_v2(self.ptr);
        }
    }
}

/// Launch the fused columnize (`COLUMNIZE_F32`) or decolumnize kernel once.
fn launch_window_kernel(
    client: &CudaClient,
    device_index: usize,
    kernel_name: &str,
    meta: &DeviceMetadata,
    launch: &WindowLaunch,
) -> Result<()> {
    let module = kernels::get_or_load_module(client.context(), device_index, CONTEXT_WINDOW_MODULE)?;
    let func = kernels::get_kernel_function(&module, kernel_name)?;

    let cfg = LaunchConfig {
        grid_dim: (
            launch.segments as u32,
            launch.max_output_rows.min(MAX_GRID_Y) as u32,
            1,
        ),
        block_dim: (BLOCK_SIZE, 1, 1),
        shared_mem_bytes: 0,
    };

    let block_ptr = meta.ptr;
    let segments_i32 = launch.segments as i32;
    let length_i32 = launch.context_length as i32;
    let width_i32 = launch.width as i32;
    let stride_i32 = launch.stride as i32;
    let pad_up_i32 = launch.pad_up as i32;

    unsafe {
        let mut builder = client.stream().launch_builder(&func);
        builder.arg(&block_ptr);
        builder.arg(&segments_i32);
        builder.arg(&length_i32);
        builder.arg(&width_i32);
        builder.arg(&stride_i32);
        builder.arg(&pad_up_i32);
        builder.launch(cfg).map_err(|e| Error::KernelError {
            reason: format!("{kernel_name} launch failed: {e:?}"),
        })?;
    }
    Ok(())
}

fn synchronize(client: &CudaClient, what: &str) -> Result<()> {
    client.stream().synchronize().map_err(|e| Error::KernelError {
        reason: format!("context projection {what} sync failed: {e:?}"),
    })
}

impl ContextProjectOps<CudaRuntime> for CudaClient {
    fn context_project_fwd(
        &self,
        input: &Tensor<CudaRuntime>,
        boundary: &[usize],
        padding: Option<&Tensor<CudaRuntime>>,
        window: &ContextWindow,
        config: &ContextProjectConfig,
    ) -> Result<Tensor<CudaRuntime>> {
        window.validate()?;
        config.validate()?;
        let padding = if window.padding_trainable {
            Some(padding.ok_or_else(|| {
                Error::invalid("padding", "trainable padding requires a padding parameter")
            })?)
        } else {
            None
        };
        let (rows, width) = check_f32_matrix("input", input)?;
        check_boundary(boundary, rows)?;
        let pad_plan = match padding {
            Some(p) => {
                let (pad_rows, pad_width) = check_f32_matrix("padding", p)?;
                check_padding_shape(pad_rows, pad_width, window, width)?;
                let plan = PaddingPlan::new(boundary, window);
                plan.check_bounds(rows * window.context_length, window.padding_rows())?;
                plan
            }
            None => PaddingPlan::default(),
        };

        let device = input.device();
        let out_width = window.output_width(width);
        let output = Tensor::<CudaRuntime>::zeros(&[rows, out_width], DType::F32, device);

        let plan = ContextPlan::build(
            boundary,
            window,
            config,
            width,
            RowAddressing::device_f32(input.ptr(), width),
            RowAddressing::device_f32(output.ptr(), out_width),
        )?;
        let meta = DeviceMetadata::upload(&plan.arrays)?;
        if !plan.launch.is_empty() {
            launch_window_kernel(self, device.id(), COLUMNIZE_F32, &meta, &plan.launch)?;
        }

        if let Some(padding) = padding.filter(|_| !pad_plan.is_empty()) {
            let stream = self.stream().cu_stream();
            let row_bytes = width * F32_BYTES;
            for span in &pad_plan.spans {
                unsafe {
                    let result = sys::cuMemcpyDtoDAsync_v2(
                        output.ptr() + (span.out_row * row_bytes) as u64,
                        padding.ptr() + (span.pad_row * row_bytes) as u64,
                        span.rows * row_bytes,
                        stream,
                    );
                    if result != sys::CUresult::CUDA_SUCCESS {
                        return Err(Error::KernelError {
                            reason: format!("padding cuMemcpyDtoDAsync_v2 failed: {:?}", result),
                        });
                    }
                }
            }
        }

        synchronize(self, "fwd")?;
        Ok(output)
    }

    fn context_project_bwd(
        &self,
        output_grad: &Tensor<CudaRuntime>,
        boundary: &[usize],
        width: usize,
        window: &ContextWindow,
        config: &ContextProjectConfig,
        input_grad: bool,
        pad_grad: bool,
    ) -> Result<(Option<Tensor<CudaRuntime>>, Option<Tensor<CudaRuntime>>)> {
        window.validate()?;
        config.validate()?;
        let (rows, out_width) = check_f32_matrix("output_grad", output_grad)?;
        check_len("output_grad", out_width, window.output_width(width))?;
        check_boundary(boundary, rows)?;
        let pad_grad = pad_grad && window.padding_trainable;
        let pad_plan = if pad_grad {
            let plan = PaddingPlan::new(boundary, window);
            plan.check_bounds(rows * window.context_length, window.padding_rows())?;
            plan
        } else {
            PaddingPlan::default()
        };

        let device = output_grad.device();
        let device_index = device.id();

        let d_input = if input_grad {
            let d_input = Tensor::<CudaRuntime>::zeros(&[rows, width], DType::F32, device);
            let plan = ContextPlan::build(
                boundary,
                window,
                config,
                width,
                RowAddressing::device_f32(d_input.ptr(), width),
                RowAddressing::device_f32(output_grad.ptr(), out_width),
            )?;
            let meta = DeviceMetadata::upload(&plan.arrays)?;
            if !plan.launch.is_empty() {
                launch_window_kernel(self, device_index, DECOLUMNIZE_F32, &meta, &plan.launch)?;
            }
            // metadata must outlive the launch
            synchronize(self, "bwd")?;
            Some(d_input)
        } else {
            None
        };

        let d_padding = if pad_grad {
            let d_padding =
                Tensor::<CudaRuntime>::zeros(&[window.padding_rows(), width], DType::F32, device);
            let module =
                kernels::get_or_load_module(self.context(), device_index, CONTEXT_WINDOW_MODULE)?;
            let func = kernels::get_kernel_function(&module, ROW_AXPY_F32)?;
            let row_bytes = (width * F32_BYTES) as u64;

            for span in &pad_plan.spans {
                let n = span.rows * width;
                let cfg = LaunchConfig {
                    grid_dim: ((n as u32).div_ceil(BLOCK_SIZE), 1, 1),
                    block_dim: (BLOCK_SIZE, 1, 1),
                    shared_mem_bytes: 0,
                };
                let src_ptr = output_grad.ptr() + span.out_row as u64 * row_bytes;
                let dst_ptr = d_padding.ptr() + span.pad_row as u64 * row_bytes;
                let n_i32 = n as i32;
                unsafe {
                    let mut builder = self.stream().launch_builder(&func);
                    builder.arg(&src_ptr);
                    builder.arg(&dst_ptr);
                    builder.arg(&n_i32);
                    builder.launch(cfg).map_err(|e| Error::KernelError {
                        reason: format!("padding grad accumulate launch failed: {e:?}"),
                    })?;
                }
            }
            synchronize(self, "padding grad")?;
            Some(d_padding)
        } else {
            None
        };

        Ok((d_input, d_padding))
    }
}
