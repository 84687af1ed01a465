use std::str::FromStr;

pub mod bss;
pub mod sizes;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format '{s}' (expected csv or json)")),
        }
    }
}

// For argp::FromArgs
pub fn output_format(value: &str) -> Result<OutputFormat, String> { value.parse() }
