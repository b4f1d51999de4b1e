//! CPU implementation of ContextProjectOps
//!
//! Copies the tensors to host vectors, runs the host functor and wraps the
//! results back into CPU tensors.

use crate::error::{Error, Result};
use crate::ops::impl_generic::context::projector::{check_f32_matrix, check_padding_shape};
use crate::ops::impl_generic::context::{ContextProjectConfig, ContextProjector, ContextWindow};
use crate::ops::traits::ContextProjectOps;
use numr::runtime::cpu::{CpuClient, CpuRuntime};
use numr::tensor::Tensor;

impl ContextProjectOps<CpuRuntime> for CpuClient {
    fn context_project_fwd(
        &self,
        input: &Tensor<CpuRuntime>,
        boundary: &[usize],
        padding: Option<&Tensor<CpuRuntime>>,
        window: &ContextWindow,
        config: &ContextProjectConfig,
    ) -> Result<Tensor<CpuRuntime>> {
        let projector = ContextProjector::new(*window, *config)?;
        let (rows, width) = check_f32_matrix("input", input)?;
        let padding = match padding {
            Some(p) if window.padding_trainable => {
                let (pad_rows, pad_width) = check_f32_matrix("padding", p)?;
                check_padding_shape(pad_rows, pad_width, window, width)?;
                Some(p.to_vec::<f32>())
            }
            _ => None,
        };

        let input_data = input.to_vec::<f32>();
        let mut out = vec![0.0f32; rows * window.output_width(width)];
        projector.forward(&input_data, width, boundary, padding.as_deref(), &mut out)?;

        Ok(Tensor::<CpuRuntime>::from_slice(
            &out,
            &[rows, window.output_width(width)],
            input.device(),
        ))
    }

    fn context_project_bwd(
        &self,
        output_grad: &Tensor<CpuRuntime>,
        boundary: &[usize],
        width: usize,
        window: &ContextWindow,
        config: &ContextProjectConfig,
        input_grad: bool,
        pad_grad: bool,
    ) -> Result<(Option<Tensor<CpuRuntime>>, Option<Tensor<CpuRuntime>>)> {
        let projector = ContextProjector::new(*window, *config)?;
        let (rows, out_width) = check_f32_matrix("output_grad", output_grad)?;
        if out_width != window.output_width(width) {
            return Err(Error::ShapeMismatch {
                arg: "output_grad",
                expected: vec![rows, window.output_width(width)],
                got: vec![rows, out_width],
            });
        }
        let device = output_grad.device();
        let grad_data = output_grad.to_vec::<f32>();

        let mut d_input = input_grad.then(|| vec![0.0f32; rows * width]);
        let mut d_padding = (pad_grad && window.padding_trainable)
            .then(|| vec![0.0f32; window.padding_rows() * width]);

        projector.backward(
            &grad_data,
            width,
            boundary,
            d_input.as_deref_mut(),
            d_padding.as_deref_mut(),
        )?;

        let d_input =
            d_input.map(|g| Tensor::<CpuRuntime>::from_slice(&g, &[rows, width], device));
        let d_padding = d_padding.map(|g| {
            Tensor::<CpuRuntime>::from_slice(&g, &[window.padding_rows(), width], device)
        });
        Ok((d_input, d_padding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::cpu_setup;

    #[test]
    fn test_fwd_shape_and_values() {
        let (client, dev) = cpu_setup();
        let input = Tensor::<CpuRuntime>::from_slice(
            &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
            &[4, 2],
            &dev,
        );
        let window = ContextWindow::new(-1, 3);
        let out = client
            .context_project_fwd(&input, &[0, 3, 4], None, &window, &ContextProjectConfig::default())
            .unwrap();
        assert_eq!(out.shape(), &[4, 6]);
        let data = out.to_vec::<f32>();
        assert_eq!(&data[18..], &[0.0, 0.0, 7.0, 8.0, 0.0, 0.0]);
    }

    #[test]
    fn test_fwd_rejects_non_f32() {
        let (client, dev) = cpu_setup();
        let input = Tensor::<CpuRuntime>::from_slice(&[1i32, 2, 3], &[3, 1], &dev);
        let err = client
            .context_project_fwd(
                &input,
                &[0, 3],
                None,
                &ContextWindow::new(-1, 3),
                &ContextProjectConfig::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::DTypeMismatch { .. }));
    }

    #[test]
    fn test_fwd_requires_padding_when_trainable() {
        let (client, dev) = cpu_setup();
        let input = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 2.0, 3.0], &[3, 1], &dev);
        let window = ContextWindow::new(-1, 3).with_trainable_padding(true);
        let err = client
            .context_project_fwd(&input, &[0, 3], None, &window, &ContextProjectConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "padding", .. }));
    }

    #[test]
    fn test_fwd_rejects_padding_with_wrong_2d_shape() {
        let (client, dev) = cpu_setup();
        let input = Tensor::<CpuRuntime>::from_slice(&[1.0f32; 6], &[3, 2], &dev);
        let window = ContextWindow::new(-1, 3).with_trainable_padding(true);
        // Same element count as [2, 2], wrong layout
        let padding = Tensor::<CpuRuntime>::from_slice(&[9.0f32; 4], &[1, 4], &dev);
        let err = client
            .context_project_fwd(
                &input,
                &[0, 3],
                Some(&padding),
                &window,
                &ContextProjectConfig::default(),
            )
            .unwrap_err();
        match err {
            Error::ShapeMismatch {
                arg: "padding",
                expected,
                got,
            } => {
                assert_eq!(expected, vec![2, 2]);
                assert_eq!(got, vec![1, 4]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bwd_returns_requested_grads_only() {
        let (client, dev) = cpu_setup();
        let window = ContextWindow::new(-1, 3).with_trainable_padding(true);
        let grad = Tensor::<CpuRuntime>::from_slice(&[1.0f32; 9], &[3, 3], &dev);
        let cfg = ContextProjectConfig::default();

        let (d_in, d_pad) = client
            .context_project_bwd(&grad, &[0, 3], 1, &window, &cfg, true, false)
            .unwrap();
        assert_eq!(d_in.unwrap().to_vec::<f32>(), vec![2.0, 3.0, 2.0]);
        assert!(d_pad.is_none());

        let (d_in, d_pad) = client
            .context_project_bwd(&grad, &[0, 3], 1, &window, &cfg, false, true)
            .unwrap();
        assert!(d_in.is_none());
        let d_pad = d_pad.unwrap();
        assert_eq!(d_pad.shape(), &[2, 1]);
        assert_eq!(d_pad.to_vec::<f32>(), vec![1.0, 1.0]);
    }
}
