use std::env;
use std::error::Error;
use std::sync::Arc;

use log::info;

use ferrite_models::{CancelToken, ErrorKind, FsAdapter, ModelSpec, Registry, RegistryConfig};

const DEFAULT_STORE: &str = "./model_store";
const MODEL: &str = "xor";

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let root = env::args().nth(1).unwrap_or_else(|| DEFAULT_STORE.to_string());
    let config = match env::var("REGISTRY_CONFIG") {
        Ok(path) => RegistryConfig::load_json(&path)?,
        Err(_) => RegistryConfig::default(),
    };
    let cancel = CancelToken::new();

    let adapter = Arc::new(FsAdapter::open(&root)?);
    let registry = Registry::load(adapter, config, &cancel)?;
    info!("store at {root}");

    let xor = [
        ([0.0, 0.0], 0.0),
        ([0.0, 1.0], 1.0),
        ([1.0, 0.0], 1.0),
        ([1.0, 1.0], 0.0),
    ];

    match registry.add_model(ModelSpec::new(MODEL, vec![2, 3, 1], 0.01, 20_000)?, &cancel) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::DuplicateName => {}
        Err(e) => return Err(e.into()),
    }
    if registry.example_count(MODEL, &cancel)? == 0 {
        for (input, output) in &xor {
            registry.add_example(MODEL, input.to_vec(), vec![*output], None, &cancel)?;
        }
    }

    let report = registry.train(MODEL, &cancel)?;
    println!(
        "trained '{}': error {:.6} after {} epochs (target reached: {})",
        report.model, report.final_error, report.epochs, report.reached_target
    );

    for (input, expected) in &xor {
        let output = registry.run(MODEL, input)?;
        println!("Input: {:?} -> Output: {:.4} (expected {})", input, output[0], expected);
    }

    for model in registry.list_models() {
        println!("{} {:?} {:?}", model.name, model.layers, model.state);
    }
    Ok(())
}
