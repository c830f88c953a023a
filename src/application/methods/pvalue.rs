//! Multiple-testing p-value adjustments.
//!
//! Missing p-values (`NaN`) stay missing and do not count towards the number
//! of tests.

use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustMethod {
    Bonferroni,
    Holm,
    Hochberg,
    /// Benjamini-Hochberg
    BH,
    /// Benjamini-Yekutieli
    BY,
}

impl AdjustMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AdjustMethod::Bonferroni => "bonferroni",
            AdjustMethod::Holm => "holm",
            AdjustMethod::Hochberg => "hochberg",
            AdjustMethod::BH => "BH",
            AdjustMethod::BY => "BY",
        }
    }

    pub fn all() -> [AdjustMethod; 5] {
        [
            AdjustMethod::Bonferroni,
            AdjustMethod::Holm,
            AdjustMethod::Hochberg,
            AdjustMethod::BH,
            AdjustMethod::BY,
        ]
    }
}

impl FromStr for AdjustMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bonferroni" => Ok(AdjustMethod::Bonferroni),
            "holm" => Ok(AdjustMethod::Holm),
            "hochberg" => Ok(AdjustMethod::Hochberg),
            "bh" | "fdr" => Ok(AdjustMethod::BH),
            "by" => Ok(AdjustMethod::BY),
            _ => anyhow::bail!(
                "Invalid adjustment method: {}. Must be 'bonferroni', 'holm', 'hochberg', 'BH' or 'BY'",
                s
            ),
        }
    }
}

/// Adjusts `p` for multiple comparisons. The output is aligned with the input.
pub fn adjust(p: &[f64], method: AdjustMethod) -> Vec<f64> {
    let mut adjusted = vec![f64::NAN; p.len()];
    let present: Vec<usize> = (0..p.len()).filter(|&i| !p[i].is_nan()).collect();
    let n = present.len();
    if n == 0 {
        return adjusted;
    }
    let nf = n as f64;

    match method {
        AdjustMethod::Bonferroni => {
            for &i in &present {
                adjusted[i] = (p[i] * nf).min(1.0);
            }
        }
        AdjustMethod::Holm => {
            // Step-down: ascending order, running maximum
            let order = sorted(&present, p, false);
            let mut running = 0.0_f64;
            for (rank, &i) in order.iter().enumerate() {
                running = running.max((nf - rank as f64) * p[i]);
                adjusted[i] = running.min(1.0);
            }
        }
        AdjustMethod::Hochberg | AdjustMethod::BH | AdjustMethod::BY => {
            // Step-up: descending order, running minimum
            let q = match method {
                AdjustMethod::BY => (1..=n).map(|k| 1.0 / k as f64).sum::<f64>(),
                _ => 1.0,
            };
            let order = sorted(&present, p, true);
            let mut running = f64::INFINITY;
            for (pos, &i) in order.iter().enumerate() {
                let rank = (n - pos) as f64;
                let factor = match method {
                    AdjustMethod::Hochberg => nf - rank + 1.0,
                    _ => q * nf / rank,
                };
                running = running.min(factor * p[i]);
                adjusted[i] = running.min(1.0);
            }
        }
    }

    adjusted
}

fn sorted(indices: &[usize], p: &[f64], descending: bool) -> Vec<usize> {
    let mut order = indices.to_vec();
    // Stable sort keeps ties in input order
    order.sort_by(|&a, &b| {
        let cmp = p[a].partial_cmp(&p[b]).unwrap_or(Ordering::Equal);
        if descending { cmp.reverse() } else { cmp }
    });
    order
}
