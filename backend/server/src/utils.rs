use std::collections::HashSet;

/// Trims names, drops empty ones and keeps the first occurrence of each.
pub fn unique_names<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();

    raw.iter()
        .map(|name| name.as_ref().trim())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

pub fn parse_participants(list: &str) -> Vec<String> {
    let raw: Vec<&str> = list.split(',').collect();

    unique_names(&raw)
}
