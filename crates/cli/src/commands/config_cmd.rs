//! `remedian config` — print the default configuration.

use remedian_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}
