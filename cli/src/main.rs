use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use clap::Parser;
use operator::{create_operator, SequenceMaskConfig};
use serde::{Deserialize, Serialize};

fn main() {
    if let Err(err) = run() {
        eprintln!("sequence-mask failed: {err:#}");
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Apply a sequence mask to a tensor stored as JSON", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "PATH", help = "JSON case file with shape, data and sequence_length")]
    input: PathBuf,

    #[arg(short, long, value_name = "PATH", help = "Operator config file (.json or .toml)")]
    config: Option<PathBuf>,

    #[arg(
        long = "override",
        value_name = "KEY=VALUE",
        help = "Override a config option, e.g. use_sequence_length=true"
    )]
    overrides: Vec<OverrideArg>,

    #[arg(long, help = "Also print the data gradient for an all-ones output gradient")]
    backward: bool,
}

#[derive(Debug, Clone)]
struct OverrideArg {
    key: String,
    value: String,
}

impl FromStr for OverrideArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| "override must be in the form key=value".to_string())?;
        if key.trim().is_empty() {
            return Err("override key must not be empty".into());
        }
        Ok(Self {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
        })
    }
}

/// Input tensor in flat row-major form.
#[derive(Debug, Deserialize)]
struct MaskCase {
    shape: Vec<usize>,
    data: Vec<f64>,
    #[serde(default)]
    sequence_length: Option<Vec<i64>>,
    #[serde(default)]
    dtype: Option<String>,
}

#[derive(Debug, Serialize)]
struct MaskReport {
    backend: String,
    shape: Vec<usize>,
    output: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_grad: Option<Vec<f64>>,
}

fn run() -> Result<()> {
    let args = Args::parse();

    let config = build_config(args.config.as_deref(), &args.overrides)?;

    let contents = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let case: MaskCase = serde_json::from_str(&contents)?;
    let dtype = parse_dtype(case.dtype.as_deref())?;

    let device = sequence_mask::setup_device()?;
    // f64 and i64 are not available on every accelerator, so stage on the CPU.
    let data = Tensor::from_vec(case.data, case.shape.as_slice(), &Device::Cpu)?
        .to_dtype(dtype)?
        .to_device(&device)?;
    let lengths = case
        .sequence_length
        .map(|lengths| {
            let len = lengths.len();
            Tensor::from_vec(lengths, len, &Device::Cpu)
        })
        .transpose()?;

    let op = create_operator(&config, &device, dtype)?;
    let output = op.forward(&data, lengths.as_ref())?;
    let data_grad = if args.backward {
        let (grad, _) = op.backward(&output.ones_like()?, lengths.as_ref())?;
        Some(flatten(&grad)?)
    } else {
        None
    };

    let report = MaskReport {
        backend: op.backend().to_string(),
        shape: output.dims().to_vec(),
        output: flatten(&output)?,
        data_grad,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Loads the config file, then applies environment overrides, then the
/// command-line `--override` pairs, so explicit flags win.
fn build_config(path: Option<&Path>, overrides: &[OverrideArg]) -> Result<SequenceMaskConfig> {
    let mut config = match path {
        Some(path) => SequenceMaskConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SequenceMaskConfig::default(),
    };
    config.apply_env_overrides();
    for OverrideArg { key, value } in overrides {
        config.set(key, value)?;
    }
    config.validate()?;
    Ok(config)
}

fn parse_dtype(name: Option<&str>) -> Result<DType> {
    match name.map(|name| name.trim().to_ascii_lowercase()).as_deref() {
        None | Some("f32") | Some("float32") => Ok(DType::F32),
        Some("f64") | Some("float64") => Ok(DType::F64),
        Some("f16") | Some("float16") => Ok(DType::F16),
        Some("bf16") | Some("bfloat16") => Ok(DType::BF16),
        Some(other) => Err(anyhow!("unsupported dtype '{other}'")),
    }
}

fn flatten(tensor: &Tensor) -> Result<Vec<f64>> {
    Ok(tensor.to_dtype(DType::F64)?.flatten_all()?.to_vec1::<f64>()?)
}
