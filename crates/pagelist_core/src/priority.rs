use crate::error::{ParameterError, ParameterResult};

/// Parameters other parameters depend on, in the order they must run.
pub const PRIORITY_PARAMETERS: &[&str] = &[
    "distinct",
    "openreferences",
    "ignorecase",
    "category",
    "goal",
    "ordercollation",
    "ordermethod",
    "includepage",
    "include",
];

fn priority_rank(name: &str) -> Option<usize> {
    PRIORITY_PARAMETERS
        .iter()
        .position(|candidate| *candidate == name)
}

/// Moves priority parameters to the front, ordered by their rank and keeping
/// source order among pairs of the same name. Every other pair keeps its
/// original relative position behind them.
pub fn sort_by_priority<N, V>(pairs: Vec<(N, V)>) -> ParameterResult<Vec<(N, V)>>
where
    N: AsRef<str>,
{
    let mut prioritized: Vec<(usize, (N, V))> = Vec::new();
    let mut rest = Vec::with_capacity(pairs.len());
    for (index, pair) in pairs.into_iter().enumerate() {
        if pair.0.as_ref().is_empty() {
            return Err(ParameterError::structural(format!(
                "pair {index} has an empty parameter name"
            )));
        }
        match priority_rank(pair.0.as_ref()) {
            Some(rank) => prioritized.push((rank, pair)),
            None => rest.push(pair),
        }
    }
    // `sort_by_key` is stable, so equal ranks keep source order.
    prioritized.sort_by_key(|(rank, _)| *rank);
    Ok(prioritized
        .into_iter()
        .map(|(_, pair)| pair)
        .chain(rest)
        .collect())
}
