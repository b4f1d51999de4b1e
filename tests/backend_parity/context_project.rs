//! Backend parity tests for ContextProjectOps.

use super::helpers::*;
use numr::runtime::cpu::CpuRuntime;
use numr::tensor::Tensor;
use seqctx::{ContextProjectConfig, ContextProjectOps, ContextWindow};

/// Naive per-row reference: gather each window slot directly from the batch.
fn reference_fwd(
    input: &[f32],
    width: usize,
    boundary: &[usize],
    padding: Option<&[f32]>,
    window: &ContextWindow,
) -> Vec<f32> {
    let length = window.context_length;
    let mut out = vec![0.0f32; input.len() * length];
    for seg in boundary.windows(2) {
        let (begin, end) = (seg[0], seg[1]);
        for i in begin..end {
            for f in 0..length {
                let src = i as i64 + window.context_start + f as i64;
                let dst = (i * length + f) * width;
                let row = if src < begin as i64 {
                    padding.map(|p| (p, (src - begin as i64 + window.up_pad as i64) as usize))
                } else if src >= end as i64 {
                    padding.map(|p| (p, window.up_pad + (src - end as i64) as usize))
                } else {
                    Some((input, src as usize))
                };
                if let Some((data, r)) = row {
                    out[dst..dst + width].copy_from_slice(&data[r * width..(r + 1) * width]);
                }
            }
        }
    }
    out
}

struct Case {
    boundary: Vec<usize>,
    width: usize,
    window: ContextWindow,
}

fn cases() -> Vec<Case> {
    vec![
        Case {
            boundary: vec![0, 3, 4, 9],
            width: 4,
            window: ContextWindow::new(-1, 3),
        },
        Case {
            boundary: vec![0, 0, 5, 5, 12],
            width: 3,
            window: ContextWindow::new(-2, 5).with_trainable_padding(true),
        },
        Case {
            boundary: vec![0, 2, 9, 10],
            width: 8,
            window: ContextWindow::new(1, 3).with_trainable_padding(true),
        },
        Case {
            boundary: vec![0, 6, 13],
            width: 5,
            window: ContextWindow::new(0, 2),
        },
    ]
}

#[test]
fn test_context_project_fwd_parity() {
    let (cpu_client, cpu_device) = setup_cpu();
    let cfg = ContextProjectConfig::default();

    for case in cases() {
        let rows = *case.boundary.last().unwrap();
        let input = det_tensor(&[rows, case.width], &cpu_device);
        let padding = det_tensor(&[case.window.padding_rows().max(1), case.width], &cpu_device);
        let padding = case.window.padding_trainable.then_some(&padding);

        let cpu_out = cpu_client
            .context_project_fwd(&input, &case.boundary, padding, &case.window, &cfg)
            .unwrap();
        let cpu_vec = cpu_out.to_vec::<f32>();
        let pad_vec = padding.map(|p| p.to_vec::<f32>());
        let expected = reference_fwd(
            &input.to_vec::<f32>(),
            case.width,
            &case.boundary,
            pad_vec.as_deref(),
            &case.window,
        );
        assert_parity_f32(&cpu_vec, &expected, "context_project_fwd CPU vs reference");

        #[cfg(feature = "cuda")]
        with_cuda_backend(|cuda_client, cuda_device| {
            use numr::runtime::cuda::CudaRuntime;
            let input_c = Tensor::<CudaRuntime>::from_slice(
                &input.to_vec::<f32>(),
                &[rows, case.width],
                &cuda_device,
            );
            let padding_c = pad_vec.as_ref().map(|p| {
                Tensor::<CudaRuntime>::from_slice(
                    p,
                    &[case.window.padding_rows(), case.width],
                    &cuda_device,
                )
            });
            let out = cuda_client
                .context_project_fwd(
                    &input_c,
                    &case.boundary,
                    padding_c.as_ref(),
                    &case.window,
                    &cfg,
                )
                .unwrap();
            assert_parity_f32(
                &out.to_vec::<f32>(),
                &cpu_vec,
                "context_project_fwd CUDA vs CPU",
            );
        });
    }
}

#[test]
fn test_context_project_bwd_parity() {
    let (cpu_client, cpu_device) = setup_cpu();
    let cfg = ContextProjectConfig::default().with_workers(3);

    for case in cases() {
        let rows = *case.boundary.last().unwrap();
        let out_width = case.window.output_width(case.width);
        let grad = det_tensor(&[rows, out_width], &cpu_device);

        let (d_in, d_pad) = cpu_client
            .context_project_bwd(
                &grad,
                &case.boundary,
                case.width,
                &case.window,
                &cfg,
                true,
                true,
            )
            .unwrap();
        let d_in = d_in.unwrap().to_vec::<f32>();
        let d_pad = d_pad.map(|t| t.to_vec::<f32>());
        assert_eq!(d_pad.is_some(), case.window.padding_trainable);

        // Forward is linear, so <fwd(x), g> == <x, d_in> + <pad, d_pad>.
        let x = det_tensor(&[rows, case.width], &cpu_device);
        let pad = Tensor::<CpuRuntime>::from_slice(
            &vec![0.25f32; case.window.padding_rows() * case.width],
            &[case.window.padding_rows(), case.width],
            &cpu_device,
        );
        let fwd = cpu_client
            .context_project_fwd(
                &x,
                &case.boundary,
                case.window.padding_trainable.then_some(&pad),
                &case.window,
                &cfg,
            )
            .unwrap();
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        let lhs = dot(&fwd.to_vec::<f32>(), &grad.to_vec::<f32>());
        let mut rhs = dot(&x.to_vec::<f32>(), &d_in);
        if let Some(d_pad) = &d_pad {
            rhs += dot(&pad.to_vec::<f32>(), d_pad);
        }
        assert_parity_f32_relaxed(&[lhs], &[rhs], "context_project_bwd adjoint");

        #[cfg(feature = "cuda")]
        with_cuda_backend(|cuda_client, cuda_device| {
            use numr::runtime::cuda::CudaRuntime;
            let grad_c = Tensor::<CudaRuntime>::from_slice(
                &grad.to_vec::<f32>(),
                &[rows, out_width],
                &cuda_device,
            );
            let (c_in, c_pad) = cuda_client
                .context_project_bwd(
                    &grad_c,
                    &case.boundary,
                    case.width,
                    &case.window,
                    &cfg,
                    true,
                    true,
                )
                .unwrap();
            assert_parity_f32_relaxed(
                &c_in.unwrap().to_vec::<f32>(),
                &d_in,
                "context_project_bwd d_input CUDA vs CPU",
            );
            if let Some(d_pad) = &d_pad {
                assert_parity_f32_relaxed(
                    &c_pad.unwrap().to_vec::<f32>(),
                    d_pad,
                    "context_project_bwd d_padding CUDA vs CPU",
                );
            }
        });
    }
}
