use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;

use crate::config::{Config, ConfigValue};

#[derive(Clone, ValueEnum, Default)]
pub enum ConfigFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: ConfigFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    ConfigFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    ConfigFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        print_optional("server_url", config.server_url.as_ref());
                        let masked = config
                            .api_key
                            .as_ref()
                            .map(|key| ConfigValue::new("********".to_string(), key.source.clone()));
                        print_optional("api_key", masked.as_ref());

                        println!("default_unit: {}", config.default_unit.value);
                        println!("  source: {}", config.default_unit.source);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'shop config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let default_config = r#"# shoplist configuration

# Shoplist server to sync with
server_url: http://localhost:8080

# API key, if the server requires one
# api_key: your-secret-key-here

# Unit for items added without one
# default_unit: 個
"#;

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

fn print_optional(name: &str, value: Option<&ConfigValue<String>>) {
    match value {
        Some(v) => {
            println!("{}: {}", name, v.value);
            println!("  source: {}", v.source);
        }
        None => println!("{}: (not set)", name),
    }
    println!();
}
