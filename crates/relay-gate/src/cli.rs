use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "relay-gate",
    version,
    about = "Interceptable TCP relay with human-in-the-loop message review"
)]
pub struct Cli {
    /// Source/destination port pairs: SRCPORT DSTPORT [SRCPORT DSTPORT ...]
    #[arg(required = true)]
    pub ports: Vec<u16>,

    /// Port for the review WebSocket server (overrides config file setting)
    #[arg(short = 'r', long)]
    pub review_port: Option<u16>,

    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,
}

impl Cli {
    /// Split the positional port list into (source, destination) pairs.
    /// Each pair becomes one relay channel.
    pub fn port_pairs(&self) -> anyhow::Result<Vec<(u16, u16)>> {
        if self.ports.len() % 2 != 0 {
            anyhow::bail!(
                "ports must come in SRCPORT DSTPORT pairs; got {} value(s)",
                self.ports.len()
            );
        }
        Ok(self.ports.chunks(2).map(|pair| (pair[0], pair[1])).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_pair_parses() {
        let cli = Cli::try_parse_from(["relay-gate", "9001", "9002"]).unwrap();
        assert_eq!(cli.port_pairs().unwrap(), vec![(9001, 9002)]);
        assert_eq!(cli.review_port, None);
    }

    #[test]
    fn several_pairs_parse_in_order() {
        let cli =
            Cli::try_parse_from(["relay-gate", "9001", "9002", "9003", "9004"]).unwrap();
        assert_eq!(
            cli.port_pairs().unwrap(),
            vec![(9001, 9002), (9003, 9004)]
        );
    }

    #[test]
    fn an_odd_port_count_is_rejected() {
        let cli = Cli::try_parse_from(["relay-gate", "9001", "9002", "9003"]).unwrap();
        assert!(cli.port_pairs().is_err());
    }

    #[test]
    fn no_ports_is_a_usage_error() {
        assert!(Cli::try_parse_from(["relay-gate"]).is_err());
    }

    #[test]
    fn review_port_flag_is_accepted() {
        let cli =
            Cli::try_parse_from(["relay-gate", "-r", "8080", "9001", "9002"]).unwrap();
        assert_eq!(cli.review_port, Some(8080));
    }

    #[test]
    fn non_numeric_ports_are_rejected() {
        assert!(Cli::try_parse_from(["relay-gate", "nine", "9002"]).is_err());
    }
}
