use chrono::DateTime;
use color_eyre::eyre::{
    Result,
    eyre,
};
use ethers::types::{
    Address,
    H256,
};

pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

/// House edge on a winning bet, in basis points. The chain program pays
/// winners 1.95x their stake.
pub const HOUSE_EDGE_BPS: u128 = 500;

pub const BASE_MAINNET_CHAIN_ID: u64 = 8453;
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;

/// `0x12345678...abcd` style address preview.
pub fn format_address(address: &Address) -> String {
    let hex = format!("{address:#x}");
    format!("{}...{}", &hex[..6], &hex[hex.len() - 4..])
}

pub fn format_hash(hash: &H256) -> String {
    let hex = format!("{hash:#x}");
    format!("{}...{}", &hex[..10], &hex[hex.len() - 6..])
}

/// Render a wei amount as ETH with a fixed number of fraction digits.
pub fn format_eth(wei: u128, decimals: usize) -> String {
    let whole = wei / WEI_PER_ETH;
    if decimals == 0 {
        return whole.to_string();
    }
    let frac = format!("{:018}", wei % WEI_PER_ETH);
    format!("{whole}.{}", &frac[..decimals.min(18)])
}

/// Signed variant for profit displays: `+0.0095 ETH` / `-0.0100 ETH`.
pub fn format_eth_signed(wei: i128, decimals: usize) -> String {
    let sign = if wei < 0 { "-" } else { "+" };
    format!("{sign}{}", format_eth(wei.unsigned_abs(), decimals))
}

/// Parse a decimal ETH amount ("0.01") into wei.
pub fn parse_eth(input: &str) -> Result<u128> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(eyre!("empty amount"));
    }
    let (whole, frac) = match trimmed.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (trimmed, ""),
    };
    if frac.len() > 18 {
        return Err(eyre!("amount has more than 18 decimal places"));
    }
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| eyre!("invalid amount: {trimmed}"))?
    };
    let frac_wei: u128 = if frac.is_empty() {
        0
    } else {
        let scaled: u128 = frac
            .parse()
            .map_err(|_| eyre!("invalid amount: {trimmed}"))?;
        scaled * 10u128.pow(18 - frac.len() as u32)
    };
    whole
        .checked_mul(WEI_PER_ETH)
        .and_then(|wei| wei.checked_add(frac_wei))
        .ok_or_else(|| eyre!("amount out of range: {trimmed}"))
}

/// Amount returned to the player on a win: stake plus winnings at the
/// house's 1.95x multiplier.
pub fn potential_win(bet_wei: u128) -> u128 {
    let winnings = bet_wei.saturating_mul(10_000 - HOUSE_EDGE_BPS) / 10_000;
    bet_wei.saturating_add(winnings)
}

pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("t+{timestamp}"))
}

pub fn explorer_tx_url(chain_id: u64, hash: &H256) -> String {
    format!("{}/tx/{hash:#x}", explorer_base(chain_id))
}

pub fn explorer_address_url(chain_id: u64, address: &Address) -> String {
    format!("{}/address/{address:#x}", explorer_base(chain_id))
}

fn explorer_base(chain_id: u64) -> &'static str {
    match chain_id {
        BASE_MAINNET_CHAIN_ID => "https://basescan.org",
        _ => "https://sepolia.basescan.org",
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn format_address__shortens_to_prefix_and_suffix() {
        let address = Address::from([0xabu8; 20]);
        assert_eq!(format_address(&address), "0xabab...abab");
    }

    #[test]
    fn format_eth__renders_fixed_decimals() {
        assert_eq!(format_eth(WEI_PER_ETH, 4), "1.0000");
        assert_eq!(format_eth(WEI_PER_ETH / 100, 4), "0.0100");
        assert_eq!(format_eth(0, 4), "0.0000");
        assert_eq!(format_eth(3 * WEI_PER_ETH / 2, 0), "1");
    }

    #[test]
    fn format_eth_signed__carries_the_sign() {
        assert_eq!(format_eth_signed(-(WEI_PER_ETH as i128), 2), "-1.00");
        assert_eq!(format_eth_signed(WEI_PER_ETH as i128 / 2, 2), "+0.50");
    }

    #[test]
    fn parse_eth__accepts_whole_and_fractional_amounts() {
        assert_eq!(parse_eth("1").unwrap(), WEI_PER_ETH);
        assert_eq!(parse_eth("0.01").unwrap(), WEI_PER_ETH / 100);
        assert_eq!(parse_eth(".5").unwrap(), WEI_PER_ETH / 2);
        assert_eq!(parse_eth(" 2.5 ").unwrap(), 5 * WEI_PER_ETH / 2);
    }

    #[test]
    fn parse_eth__rejects_garbage() {
        assert!(parse_eth("").is_err());
        assert!(parse_eth("abc").is_err());
        assert!(parse_eth("1.2.3").is_err());
        assert!(parse_eth("0.0000000000000000001").is_err());
    }

    #[test]
    fn parse_eth__round_trips_format_eth() {
        let wei = 12_345 * WEI_PER_ETH / 10_000;
        assert_eq!(parse_eth(&format_eth(wei, 4)).unwrap(), wei);
    }

    #[test]
    fn potential_win__returns_stake_plus_winnings() {
        assert_eq!(potential_win(10_000), 19_500);
        assert_eq!(potential_win(0), 0);
    }

    #[test]
    fn explorer_urls__pick_network_by_chain_id() {
        let hash = H256::zero();
        assert!(
            explorer_tx_url(BASE_MAINNET_CHAIN_ID, &hash).starts_with("https://basescan.org/tx/")
        );
        assert!(
            explorer_tx_url(BASE_SEPOLIA_CHAIN_ID, &hash)
                .starts_with("https://sepolia.basescan.org/tx/")
        );
    }
}
