//! Engine job names.
//!
//! Engines such as Dataflow only accept lower-case alphanumerics and dashes
//! in job names, so every derived name goes through [`sanitize`].

use regex::Regex;
use std::sync::OnceLock;

pub const JOB_NAME_FLAG: &str = "--job_name";

fn disallowed() -> &'static Regex {
    static DISALLOWED: OnceLock<Regex> = OnceLock::new();
    DISALLOWED.get_or_init(|| Regex::new(r"[^0-9a-zA-Z-]+").expect("static pattern"))
}

/// Lower-case `raw` and collapse every run of characters outside `[0-9a-zA-Z-]` into one `-`
pub fn sanitize(raw: &str) -> String {
    disallowed().replace_all(&raw.to_lowercase(), "-").into_owned()
}

/// `<pipeline>-<timestamp>`
pub fn orchestrator_job_name(pipeline_name: &str, timestamp: i64) -> String {
    sanitize(&format!("{}-{}", pipeline_name, timestamp))
}

/// `<pipeline>-<node>-<timestamp>`
pub fn node_job_name(pipeline_name: &str, node_id: &str, timestamp: i64) -> String {
    sanitize(&format!("{}-{}-{}", pipeline_name, node_id, timestamp))
}

pub fn job_name_arg(job_name: &str) -> String {
    format!("{}={}", JOB_NAME_FLAG, job_name)
}

/// Value of the last `--job_name=` flag in `args`, if any
pub fn find_job_name(args: &[String]) -> Option<&str> {
    args.iter()
        .rev()
        .find_map(|arg| arg.strip_prefix(JOB_NAME_FLAG)?.strip_prefix('='))
}

/// Drop any user-supplied job name and append `job_name`
pub fn replace_job_name(args: &[String], job_name: &str) -> Vec<String> {
    args.iter()
        .filter(|arg| !arg.starts_with(JOB_NAME_FLAG))
        .cloned()
        .chain(std::iter::once(job_name_arg(job_name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_job_name() {
        assert_eq!(
            orchestrator_job_name("My Pipeline!", 1700000000),
            "my-pipeline--1700000000"
        );
    }

    #[test]
    fn test_node_job_name() {
        assert_eq!(
            node_job_name("Taxi_Pipeline", "Trainer.v2", 1700000000),
            "taxi-pipeline-trainer-v2-1700000000"
        );
    }

    #[test]
    fn test_sanitize_keeps_dashes() {
        assert_eq!(sanitize("a--b"), "a--b");
        assert_eq!(sanitize("__a__"), "-a-");
    }

    #[test]
    fn test_replace_job_name() {
        let args = vec![
            "--runner=DataflowRunner".to_string(),
            "--job_name=user-chosen".to_string(),
            "--job_name".to_string(),
        ];

        let replaced = replace_job_name(&args, "pipe-node-1");
        assert_eq!(
            replaced,
            vec![
                "--runner=DataflowRunner".to_string(),
                "--job_name=pipe-node-1".to_string(),
            ]
        );
    }

    #[test]
    fn test_find_job_name() {
        let args = vec![
            "--job_name=first".to_string(),
            "--runner=Direct".to_string(),
            "--job_name=last".to_string(),
        ];
        assert_eq!(find_job_name(&args), Some("last"));
        assert_eq!(find_job_name(&["--runner=Direct".to_string()]), None);
        assert_eq!(find_job_name(&["--job_names=x".to_string()]), None);
    }
}
