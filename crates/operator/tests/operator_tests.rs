use anyhow::Result;
use candle_core::{DType, Device, Tensor, Var};
use operator::{
    create_operator, Backend, BackendSelection, LengthPolicy, MaskError, SequenceMaskConfig,
};

fn documented_input(device: &Device) -> Result<Tensor> {
    let values: Vec<f32> = (1..=18).map(|v| v as f32).collect();
    Ok(Tensor::from_vec(values, (3, 2, 3), device)?)
}

fn masking_config(value: f64, backend: BackendSelection) -> SequenceMaskConfig {
    SequenceMaskConfig {
        use_sequence_length: true,
        value,
        backend,
        ..SequenceMaskConfig::default()
    }
}

#[test]
fn auto_backend_binds_host_kernels_on_cpu() -> Result<()> {
    let op = create_operator(&SequenceMaskConfig::default(), &Device::Cpu, DType::F32)?;
    assert_eq!(op.backend(), Backend::Host);
    assert_eq!(op.dtype(), DType::F32);

    let config = masking_config(0.0, BackendSelection::DeviceOnly);
    let op = create_operator(&config, &Device::Cpu, DType::F16)?;
    assert_eq!(op.backend(), Backend::Device);
    Ok(())
}

#[test]
fn both_backends_reproduce_documented_examples() -> Result<()> {
    let device = Device::Cpu;
    let x = documented_input(&device)?;

    for backend in [BackendSelection::HostOnly, BackendSelection::DeviceOnly] {
        let op = create_operator(&masking_config(0.0, backend), &device, DType::F32)?;
        let lengths = Tensor::new(&[1i64, 1], &device)?;
        let out = op.forward(&x, Some(&lengths))?.to_vec3::<f32>()?;
        assert_eq!(
            out,
            vec![
                vec![vec![1., 2., 3.], vec![4., 5., 6.]],
                vec![vec![0., 0., 0.], vec![0., 0., 0.]],
                vec![vec![0., 0., 0.], vec![0., 0., 0.]],
            ],
            "{backend:?}"
        );

        let op = create_operator(&masking_config(1.0, backend), &device, DType::F32)?;
        let lengths = Tensor::new(&[2i64, 3], &device)?;
        let out = op.forward(&x, Some(&lengths))?.to_vec3::<f32>()?;
        assert_eq!(
            out,
            vec![
                vec![vec![1., 2., 3.], vec![4., 5., 6.]],
                vec![vec![7., 8., 9.], vec![10., 11., 12.]],
                vec![vec![1., 1., 1.], vec![16., 17., 18.]],
            ],
            "{backend:?}"
        );
    }
    Ok(())
}

#[test]
fn identity_without_sequence_length() -> Result<()> {
    let device = Device::Cpu;
    let x = documented_input(&device)?.to_dtype(DType::F64)?;
    let config = SequenceMaskConfig {
        value: 5.0,
        ..SequenceMaskConfig::default()
    };
    let op = create_operator(&config, &device, DType::F64)?;

    let out = op.forward(&x, None)?;
    assert_eq!(out.to_vec3::<f64>()?, x.to_vec3::<f64>()?);
    Ok(())
}

#[test]
fn arity_and_shape_errors_surface_before_kernels() -> Result<()> {
    let device = Device::Cpu;
    let x = documented_input(&device)?;

    let op = create_operator(
        &masking_config(0.0, BackendSelection::Auto),
        &device,
        DType::F32,
    )?;
    assert!(matches!(op.forward(&x, None), Err(MaskError::Shape { .. })));
    let wrong_batch = Tensor::new(&[1i64, 1, 1], &device)?;
    assert!(matches!(
        op.forward(&x, Some(&wrong_batch)),
        Err(MaskError::Shape { .. })
    ));
    let flat = x.reshape((3, 6))?;
    let lengths = Tensor::new(&[1i64, 1, 1], &device)?;
    assert!(matches!(
        op.forward(&flat, Some(&lengths)),
        Err(MaskError::Shape { .. })
    ));

    let identity = create_operator(&SequenceMaskConfig::default(), &device, DType::F32)?;
    let lengths = Tensor::new(&[1i64, 1], &device)?;
    assert!(matches!(
        identity.forward(&x, Some(&lengths)),
        Err(MaskError::Shape { .. })
    ));
    Ok(())
}

#[test]
fn dtype_errors() -> Result<()> {
    let device = Device::Cpu;
    assert!(matches!(
        create_operator(&SequenceMaskConfig::default(), &device, DType::U8),
        Err(MaskError::UnsupportedDType { .. })
    ));

    let op = create_operator(&SequenceMaskConfig::default(), &device, DType::F64)?;
    let x = documented_input(&device)?;
    assert!(matches!(
        op.forward(&x, None),
        Err(MaskError::UnsupportedDType { .. })
    ));
    Ok(())
}

#[test]
fn invalid_config_fails_construction() {
    let config = SequenceMaskConfig {
        axis: 4,
        ..SequenceMaskConfig::default()
    };
    assert!(matches!(
        create_operator(&config, &Device::Cpu, DType::F32),
        Err(MaskError::Config(_))
    ));
}

#[test]
fn backward_zeroes_masked_gradient_and_skips_lengths() -> Result<()> {
    let device = Device::Cpu;
    let lengths = Tensor::new(&[2i64, 0], &device)?;
    let grad = Tensor::ones((3, 2, 3), DType::F32, &device)?;

    for backend in [BackendSelection::HostOnly, BackendSelection::DeviceOnly] {
        let op = create_operator(&masking_config(9.0, backend), &device, DType::F32)?;
        let (data_grad, lengths_grad) = op.backward(&grad, Some(&lengths))?;
        assert!(lengths_grad.is_none());
        assert_eq!(
            data_grad.to_vec3::<f32>()?,
            vec![
                vec![vec![1., 1., 1.], vec![0., 0., 0.]],
                vec![vec![1., 1., 1.], vec![0., 0., 0.]],
                vec![vec![0., 0., 0.], vec![0., 0., 0.]],
            ],
            "{backend:?}"
        );
    }
    Ok(())
}

#[test]
fn autodiff_gradient_matches_explicit_backward() -> Result<()> {
    let device = Device::Cpu;
    let x = Var::from_tensor(&documented_input(&device)?)?;
    let lengths = Tensor::new(&[3i64, 1], &device)?;
    let op = create_operator(
        &masking_config(-2.0, BackendSelection::Auto),
        &device,
        DType::F32,
    )?;

    let out = op.forward(x.as_tensor(), Some(&lengths))?;
    let grads = out.sum_all()?.backward()?;
    let autodiff = grads
        .get(x.as_tensor())
        .ok_or_else(|| anyhow::anyhow!("missing gradient"))?;

    let (explicit, _) = op.backward(&x.as_tensor().ones_like()?, Some(&lengths))?;
    assert_eq!(autodiff.to_vec3::<f32>()?, explicit.to_vec3::<f32>()?);
    Ok(())
}

#[test]
fn reject_policy_reports_out_of_range_lengths() -> Result<()> {
    let device = Device::Cpu;
    let x = documented_input(&device)?;
    let config = SequenceMaskConfig {
        length_policy: LengthPolicy::Reject,
        ..masking_config(0.0, BackendSelection::Auto)
    };
    let op = create_operator(&config, &device, DType::F32)?;

    let lengths = Tensor::new(&[1i64, 4], &device)?;
    match op.forward(&x, Some(&lengths)) {
        Err(MaskError::OutOfRangeLength {
            batch,
            length,
            steps,
        }) => {
            assert_eq!((batch, length, steps), (1, 4, 3));
        }
        other => panic!("expected out-of-range error, got {other:?}"),
    }

    let lengths = Tensor::new(&[0i64, 3], &device)?;
    let out = op.forward(&x, Some(&lengths))?.to_vec3::<f32>()?;
    assert_eq!(out[0][0], vec![0.0; 3]);
    assert_eq!(out[2][1], vec![16., 17., 18.]);
    Ok(())
}

#[test]
fn clamp_policy_accepts_out_of_range_lengths() -> Result<()> {
    let device = Device::Cpu;
    let x = documented_input(&device)?;
    let op = create_operator(
        &masking_config(7.0, BackendSelection::Auto),
        &device,
        DType::F32,
    )?;

    let lengths = Tensor::new(&[-1i64, 99], &device)?;
    let out = op.forward(&x, Some(&lengths))?.to_vec3::<f32>()?;
    assert_eq!(out[0][0], vec![7.0; 3]);
    assert_eq!(out[2][1], vec![16., 17., 18.]);
    Ok(())
}

#[test]
fn batch_major_config_from_kwargs() -> Result<()> {
    let device = Device::Cpu;
    let config = SequenceMaskConfig::from_kwargs([
        ("use_sequence_length", "true"),
        ("axis", "1"),
        ("value", "-1"),
    ])?;
    let op = create_operator(&config, &device, DType::F32)?;

    // [batch=2, steps=3, features=3]
    let x = documented_input(&device)?.reshape((2, 3, 3))?;
    let lengths = Tensor::new(&[1u32, 3], &device)?;
    let out = op.forward(&x, Some(&lengths))?.to_vec3::<f32>()?;

    assert_eq!(out[0][0], vec![1., 2., 3.]);
    assert_eq!(out[0][1], vec![-1.0; 3]);
    assert_eq!(out[0][2], vec![-1.0; 3]);
    assert_eq!(out[1][2], vec![16., 17., 18.]);
    Ok(())
}

#[test]
fn operator_is_shareable_across_threads() -> Result<()> {
    let device = Device::Cpu;
    let op = create_operator(
        &masking_config(0.0, BackendSelection::Auto),
        &device,
        DType::F32,
    )?;
    let x = documented_input(&device)?;

    let outputs = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4i64)
            .map(|len| {
                let op = &op;
                let x = &x;
                let device = &device;
                scope.spawn(move || -> Result<Vec<f32>> {
                    let lengths = Tensor::new(&[len, len], device)?;
                    Ok(op.forward(x, Some(&lengths))?.flatten_all()?.to_vec1::<f32>()?)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect::<Result<Vec<_>>>()
    })?;

    for (len, out) in outputs.iter().enumerate() {
        let kept = out.iter().filter(|v| **v != 0.0).count();
        assert_eq!(kept, len.min(3) * 6);
    }
    Ok(())
}
