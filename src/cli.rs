//! Command-line argument parsing (spec §6): a single optional positional
//! path to a configuration file.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "hybridserver-server",
    about = "A federated catalogue server for typed web resources (HTML, XML, XSD, XSLT)."
)]
pub struct Cli {
    /// Path to a JSON/TOML/YAML configuration file. Falls back to built-in
    /// defaults plus `HYBRIDSERVER_`-prefixed environment overrides when
    /// omitted.
    pub config: Option<String>,
}

impl Cli {
    pub fn config(&self) -> Option<&str> {
        self.config.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_no_arguments() {
        let cli = Cli::parse_from(["hybridserver-server"]);
        assert_eq!(cli.config(), None);
    }

    #[test]
    fn parses_positional_config_path() {
        let cli = Cli::parse_from(["hybridserver-server", "hybridserver.json"]);
        assert_eq!(cli.config(), Some("hybridserver.json"));
    }
}
