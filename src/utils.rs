use anyhow::Result;
use colored::Colorize;
use ethers::types::{Address, H256};
use fern::colors::{Color, ColoredLevelConfig};
use itertools::Itertools;
use log::LevelFilter;

use crate::value::ScaledValue;

const ETHERSCAN_URL: &str = "https://etherscan.io";

pub fn setup_logger(level: LevelFilter) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue)
        .trace(Color::BrightBlack);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%H:%M:%S]"),
                record.target().dimmed(),
                colors.color(record.level()),
                message
            ))
        })
        .chain(std::io::stdout())
        .level(LevelFilter::Warn)
        .level_for("yield_sync", level)
        .apply()?;

    Ok(())
}

/// `0xAbCdEf...1234`: keeps `head` characters (with the prefix) and `tail` characters.
pub fn shorten_addr(address: &Address, head: usize, tail: usize) -> String {
    let full = format!("{:?}", address);
    if head + tail >= full.len() {
        return full;
    }
    format!("{}...{}", &full[..head], &full[full.len() - tail..])
}

/// Token amount with up to `decimals` fraction digits, thousands grouped.
/// Non-zero amounts below `10^-decimals` render as `< 0.0001`.
pub fn format_token(value: Option<&ScaledValue>, decimals: i64) -> Option<String> {
    let value = value?;
    let smallest = ScaledValue::from(1u64).unscale_by(decimals);
    if !value.is_zero() && value.abs() < smallest {
        return Some(format!("< {}", smallest.to_fixed(decimals)));
    }
    Some(group_thousands(&trim_zeros(&value.to_fixed(decimals))))
}

/// Dollar amount with two fraction digits.
pub fn format_usd(value: Option<&ScaledValue>) -> Option<String> {
    let value = value?;
    let fixed = group_thousands(&value.abs().to_fixed(2));
    if value.is_negative() {
        Some(format!("-${}", fixed))
    } else {
        Some(format!("${}", fixed))
    }
}

pub fn explorer_tx_url(tx_hash: &H256) -> String {
    format!("{}/tx/{:?}", ETHERSCAN_URL, tx_hash)
}

pub fn explorer_address_url(address: &Address) -> String {
    format!("{}/address/{:?}", ETHERSCAN_URL, address)
}

fn trim_zeros(fixed: &str) -> String {
    if !fixed.contains('.') {
        return fixed.to_string();
    }
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn group_thousands(fixed: &str) -> String {
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed),
    };
    let (int, fraction) = match unsigned.split_once('.') {
        Some((int, fraction)) => (int, Some(fraction)),
        None => (unsigned, None),
    };

    let grouped = int
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk))
        .join(",");

    match fraction {
        Some(fraction) => format!("{}{}.{}", sign, grouped, fraction),
        None => format!("{}{}", sign, grouped),
    }
}
