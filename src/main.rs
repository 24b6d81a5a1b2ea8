use anyhow::{Context, Result, bail};
use env_logger::Builder;
use log::{LevelFilter, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use mrm_radio_medium::common::config::RunConfig;
use mrm_radio_medium::common::scene;
use mrm_radio_medium::simulation::parameters::ParameterStore;
use mrm_radio_medium::simulation::{ChannelModel, ParameterGroup};

const USAGE: &str = "Usage: mrm-radio-medium <scene.json> [--trace] [--parameters]";

fn print_parameters(parameters: &ParameterStore) {
    for group in ParameterGroup::ALL {
        println!("[{}]", group.name());
        for parameter in group.parameters() {
            println!("  {:<24} {:<12} {}", parameter.id(), parameters.value(parameter).to_string(), parameter.description());
        }
    }
}

fn main() -> Result<()> {
    let mut scene_path = None;
    let mut trace = false;
    let mut list_parameters = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--trace" => trace = true,
            "--parameters" => list_parameters = true,
            _ if scene_path.is_none() => scene_path = Some(arg),
            _ => bail!(USAGE),
        }
    }
    let Some(scene_path) = scene_path else {
        bail!(USAGE);
    };

    let config_path = RunConfig::config_path_from_scene(&scene_path);
    let (config, config_error) = if config_path.exists() {
        match RunConfig::load(&config_path) {
            Ok(config) => (config, None),
            Err(e) => (RunConfig::default(), Some(e)),
        }
    } else {
        (RunConfig::default(), None)
    };

    // Logging setup, RUST_LOG takes precedence over the config file
    let level = config.level_filter().unwrap_or(LevelFilter::Info);
    Builder::new().filter_level(level).parse_env("RUST_LOG").init();

    if let Some(e) = config_error {
        warn!("Ignoring {}: {}", config_path.display(), e);
    }
    if config.level_filter().is_none() {
        warn!("Unknown log level '{}', using info", config.log_level);
    }

    let scene = scene::load_scene(&scene_path).with_context(|| format!("Failed to load scene {}", scene_path))?;
    info!("Loaded scene {} with {} links and {} obstacles", scene_path, scene.links.len(), scene.channel.obstacles.len());

    let mut model = ChannelModel::new();
    for e in model.load_config(&scene.channel) {
        warn!("Channel configuration: {}", e);
    }

    if list_parameters {
        print_parameters(model.parameters());
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    for (index, link) in scene.links.iter().enumerate() {
        let interference = link.interference_dbm.unwrap_or(config.interference_dbm);

        let (report, log) = if trace {
            let transmission = model.trace_link(&mut rng, link.source, link.destination, link.tx_power_dbm, interference)?;
            (transmission.report, Some(transmission.log))
        } else {
            (model.evaluate_link(&mut rng, link.source, link.destination, link.tx_power_dbm, interference)?, None)
        };

        println!(
            "Link {}: {} -> {}: signal {:.2} dBm (variance {:.2}), SNR {:.2} dB, reception probability {:.4}, RMS delay spread {:.3e} s",
            index,
            link.source,
            link.destination,
            report.signal.mean_dbm,
            report.signal.variance_db,
            report.sinr.mean_db,
            report.reception.probability,
            report.rms_delay_spread()
        );

        if let Some(log) = log {
            print!("{}", log);
        }
    }

    Ok(())
}
