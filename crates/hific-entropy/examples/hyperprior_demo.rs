//! Hyperprior Demo
//!
//! Runs the default entropy model (the `large` hyperlatent preset) over a
//! batch of Gaussian latents and prints the estimated rates in both phases.
//!
//! The convolutions are direct loops, so build with `--release`. Run with
//! `RUST_LOG=hific_entropy=debug` to see per-pass rate logs.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use hific_autograd::no_grad;
use hific_entropy::prelude::*;
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::StandardNormal;
use tracing_subscriber::EnvFilter;

fn main() -> EntropyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (n, c, h, w) = (10, 25, 16, 16);
    let mut rng = StdRng::seed_from_u64(42);

    let config = HyperpriorConfig::new(c);
    let model = Hyperprior::with_rng(config, &mut rng)?;
    println!(
        "Hyperprior: {} latent channels, {} hyperlatent channels, {} parameters",
        c,
        model.config().hyperlatent_channels(),
        model.parameters().iter().map(|p| p.numel()).sum::<usize>()
    );

    let data = ArrayD::from_shape_simple_fn(IxDyn(&[n, c, h, w]), || rng.sample::<f32, _>(StandardNormal));
    let latents = Variable::new(data, false);

    for phase in [Phase::Training, Phase::Inference] {
        let info = no_grad(|| model.forward(&latents, phase, &mut rng))?;
        println!("{phase:?}:");
        println!("  decoded shape     {:?}", info.decoded.shape());
        println!(
            "  noisy bpp         latent {:.4}  hyperlatent {:.4}  total {:.4}",
            info.latent_nbpp.item()?,
            info.hyperlatent_nbpp.item()?,
            info.total_nbpp.item()?
        );
        println!(
            "  quantized bpp     latent {:.4}  hyperlatent {:.4}  total {:.4}",
            info.latent_qbpp.item()?,
            info.hyperlatent_qbpp.item()?,
            info.total_qbpp.item()?
        );
    }

    Ok(())
}
