use std::path::Path;

pub fn show(path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
