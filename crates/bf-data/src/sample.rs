use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use bf_types::BarRecord;

/// Deterministic random-walk bar generator for demos and tests.
///
/// Prices follow a seeded +/-2% daily walk and are floored well above zero
/// so every generated bar passes record validation.
pub struct SampleBars {
    rng: StdRng,
}

impl SampleBars {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(
        &mut self,
        ticker: &str,
        start_timestamp: u64,
        interval_ns: u64,
        count: usize,
        start_price: Decimal,
    ) -> Vec<BarRecord> {
        let mut bars = Vec::with_capacity(count);
        let mut price = start_price.max(Decimal::ONE);

        for index in 0..count {
            let change_pct = (self.rng.gen::<f64>() - 0.5) * 0.04;
            let factor = Decimal::from_f64_retain(1.0 + change_pct).unwrap_or(Decimal::ONE);
            price = (price * factor).max(Decimal::ONE);

            let spread = Decimal::from_f64_retain(self.rng.gen::<f64>() * 0.02)
                .unwrap_or(Decimal::ZERO)
                * price;
            let open = price;
            let high = price + spread;
            let low = (price - spread).max(Decimal::ONE);
            let close = price;
            let volume = 1_000_000 + self.rng.gen_range(0..500_000);

            let timestamp = start_timestamp + index as u64 * interval_ns;
            if let Ok(bar) = BarRecord::new(ticker, timestamp, open, high, low, close, volume) {
                bars.push(bar);
            }
        }
        bars
    }
}
