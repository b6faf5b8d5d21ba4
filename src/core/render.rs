use ndarray::{Array1, Array2};

/// String renderings shared by every entity in the pipeline. Each entity
/// describes itself as a kind name plus a list of (field, rendered value)
/// pairs; the three forms below are derived from that list. Debug output
/// only, never parsed back.

/// Single-line form: `Kind {a: x, b: y}`.
pub fn compact(name: &str, fields: &[(&str, String)]) -> String {
    let body: Vec<String> = fields
        .iter()
        .map(|(field, value)| format!("{}: {}", field, value))
        .collect();
    format!("{} {{{}}}", name, body.join(", "))
}

/// Indented multi-line form. Field values that span multiple lines are
/// indented one level further.
pub fn pretty(name: &str, fields: &[(&str, String)]) -> String {
    let mut out = name.to_string();
    for (field, value) in fields {
        if value.contains('\n') {
            out.push_str(&format!("\n  {}:", field));
            for line in value.lines() {
                out.push_str(&format!("\n    {}", line));
            }
        } else {
            out.push_str(&format!("\n  {}: {}", field, value));
        }
    }
    out
}

/// Shortest form: `Kind(detail)`, or just `Kind` with no detail.
pub fn short(name: &str, detail: &str) -> String {
    if detail.is_empty() {
        name.to_string()
    } else {
        format!("{}({})", name, detail)
    }
}

pub fn mat_summary(m: &Array2<f64>) -> String {
    format!("{}x{}", m.nrows(), m.ncols())
}

pub fn vec_summary(v: &Array1<f64>) -> String {
    format!("len {}", v.len())
}

pub fn mat_full(m: &Array2<f64>) -> String {
    format!("{}", m)
}

pub fn vec_full(v: &Array1<f64>) -> String {
    format!("{}", v)
}

pub fn mat_opt(m: Option<&Array2<f64>>, full: bool) -> String {
    match m {
        Some(m) if full => mat_full(m),
        Some(m) => mat_summary(m),
        None => "-".to_string(),
    }
}

pub fn vec_opt(v: Option<&Array1<f64>>, full: bool) -> String {
    match v {
        Some(v) if full => vec_full(v),
        Some(v) => vec_summary(v),
        None => "-".to_string(),
    }
}
