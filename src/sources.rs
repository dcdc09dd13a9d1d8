use anyhow::Result;

use crate::config::Config;
use crate::registry::{self, ProbeOutcome};

/// `histdex sources`: every probed location and the databases found there.
pub fn list_sources(config: &Config) -> Result<()> {
    let candidates = registry::candidates_from_config(config);
    let discovery = registry::discover(&candidates)?;

    println!("{:<16} {:<10} {:<10} ROOT", "LOCATION", "KIND", "STATUS");
    for probe in &discovery.probes {
        let status = match probe.outcome {
            ProbeOutcome::Found(0) => "EMPTY".to_string(),
            ProbeOutcome::Found(n) => format!("{} found", n),
            ProbeOutcome::Absent => "ABSENT".to_string(),
        };
        println!(
            "{:<16} {:<10} {:<10} {}",
            probe.location.name,
            probe.location.kind.as_str(),
            status,
            probe.location.root.display()
        );
    }

    if !discovery.extractors.is_empty() {
        println!();
        println!("{:<40} {:<10} DATABASE", "SOURCE", "KIND");
        for extractor in &discovery.extractors {
            println!(
                "{:<40} {:<10} {}",
                extractor.name(),
                extractor.kind(),
                extractor.source_path().display()
            );
        }
    }

    Ok(())
}
