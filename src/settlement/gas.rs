// Gas price unit conversions. Config is expressed in gwei, the chain speaks wei.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const WEI_PER_GWEI: Decimal = dec!(1_000_000_000);

/// Gwei (fractions allowed) to wei, truncating below one wei.
/// `None` for negative input.
pub fn gwei_to_wei(gwei: Decimal) -> Option<u128> {
    if gwei.is_sign_negative() {
        return None;
    }
    gwei.checked_mul(WEI_PER_GWEI)?.trunc().to_u128()
}

/// Wei to gwei for logging
pub fn wei_to_gwei(wei: u128) -> Decimal {
    i128::try_from(wei)
        .ok()
        .and_then(|w| Decimal::try_from_i128_with_scale(w, 9).ok())
        .map(|d| d.normalize())
        .unwrap_or(Decimal::MAX)
}
