//! CLI subcommand handlers.

use crate::Commands;
use crate::render;
use medlit_core::config::MedlitConfig;
use medlit_core::{LiteraturePipeline, QueryAnalyzer, SearchRequest, Vocabulary};
use std::sync::Arc;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, config: MedlitConfig) -> anyhow::Result<()> {
    match command {
        Commands::Search {
            query,
            max_results,
            sources,
            json,
            trace,
        } => {
            let max_results = max_results.unwrap_or(config.pipeline.default_max_results);
            let mut request = SearchRequest::new(query, max_results);
            if let Some(sources) = sources {
                request = request.with_sources(sources);
            }
            let pipeline = build_pipeline(config)?;
            let outcome = pipeline.search_traced(request).await;
            if json {
                let value = if trace {
                    serde_json::json!({ "result": outcome.result, "trace": outcome.trace })
                } else {
                    serde_json::to_value(&outcome.result)?
                };
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print!("{}", render::results(&outcome.result));
                if trace {
                    print!("{}", render::trace(&outcome.trace));
                    if let Some(cache) = pipeline.term_cache() {
                        print!("{}", render::cache_stats(&cache.stats()));
                    }
                }
            }
            Ok(())
        }
        Commands::Analyze { query, json } => {
            let vocabulary = load_vocabulary(&config)?;
            let analysis = QueryAnalyzer::new(vocabulary).analyze(&query);
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print!("{}", render::analysis(&analysis));
            }
            Ok(())
        }
        Commands::Plan {
            query,
            sources,
            json,
        } => {
            let mut request = SearchRequest::new(query, config.pipeline.default_max_results);
            if let Some(sources) = sources {
                request = request.with_sources(sources);
            }
            let pipeline = build_pipeline(config)?;
            let (analysis, strategy) = pipeline.plan(&request);
            if json {
                let value = serde_json::json!({ "analysis": analysis, "strategy": strategy });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print!("{}", render::analysis(&analysis));
                print!("{}", render::strategy(&strategy));
            }
            Ok(())
        }
        Commands::Sources => {
            let sources = medlit_sources::build_sources(&config.sources)?;
            if sources.is_empty() {
                println!("No sources enabled.");
            }
            for source in sources {
                let profile = source.profile();
                println!(
                    "  {:<18} {:<15} reliability {:.2}",
                    profile.name,
                    format!("{:?}", profile.kind),
                    profile.reliability
                );
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn build_pipeline(config: MedlitConfig) -> anyhow::Result<LiteraturePipeline> {
    let sources = medlit_sources::build_sources(&config.sources)?;
    Ok(LiteraturePipeline::new(sources, config)?)
}

fn load_vocabulary(config: &MedlitConfig) -> anyhow::Result<Arc<Vocabulary>> {
    let vocabulary = match &config.vocabulary_path {
        Some(path) => Vocabulary::from_path(path)
            .map_err(|e| anyhow::anyhow!("Failed to load vocabulary {}: {}", path.display(), e))?,
        None => Vocabulary::builtin(),
    };
    Ok(Arc::new(vocabulary))
}
