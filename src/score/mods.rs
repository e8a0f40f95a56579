use super::ScoreMod;

/// Effective playback rate of a set of mods.
///
/// Mods that carry an explicit rate setting use it; otherwise well-known
/// rate-changing acronyms fall back to their default rates. Unknown mods
/// contribute nothing. Rates multiply, so DT + a custom 1.1x rate yields
/// 1.65x.
pub fn effective_rate(mods: &[ScoreMod]) -> f64 {
    let mut rate = 1.0;

    for score_mod in mods {
        if let Some(explicit) = score_mod.rate {
            rate *= explicit;
            continue;
        }

        rate *= match score_mod.acronym.as_str() {
            "DT" | "NC" => 1.5,
            "HT" | "DC" => 0.75,
            _ => 1.0,
        };
    }

    rate
}
