use super::options::Options;

pub fn init_args(options: &Options) -> Vec<String> {
    let mut args = vec!["init".to_string(), format!("-upgrade={}", options.upgrade)];
    if options.reconfigure {
        args.push("-reconfigure".to_string());
    }
    for (key, value) in &options.backend_config {
        args.push(format!("-backend-config={key}={value}"));
    }
    finish(options, args)
}

pub fn validate_args(options: &Options) -> Vec<String> {
    finish(options, vec!["validate".to_string()])
}

pub fn apply_args(options: &Options) -> Vec<String> {
    let mut args = vec![
        "apply".to_string(),
        "-input=false".to_string(),
        "-auto-approve".to_string(),
    ];
    args.extend(common_args(options));
    finish(options, args)
}

pub fn plan_exit_code_args(options: &Options) -> Vec<String> {
    let mut args = vec![
        "plan".to_string(),
        "-input=false".to_string(),
        "-detailed-exitcode".to_string(),
    ];
    args.extend(common_args(options));
    finish(options, args)
}

pub fn destroy_args(options: &Options) -> Vec<String> {
    let mut args = vec![
        "destroy".to_string(),
        "-auto-approve".to_string(),
        "-input=false".to_string(),
    ];
    args.extend(common_args(options));
    finish(options, args)
}

pub fn output_args(options: &Options) -> Vec<String> {
    finish(options, vec!["output".to_string(), "-json".to_string()])
}

/// Variable, locking and targeting flags shared by apply, plan and destroy.
fn common_args(options: &Options) -> Vec<String> {
    let mut args = Vec::new();

    for (name, value) in &options.vars {
        args.push("-var".to_string());
        args.push(format!("{name}={}", var_value(value)));
    }
    for file in &options.var_files {
        args.push(format!("-var-file={}", file.display()));
    }

    args.push(format!("-lock={}", options.lock));
    if let Some(timeout) = &options.lock_timeout {
        args.push(format!("-lock-timeout={timeout}"));
    }
    if let Some(parallelism) = options.parallelism {
        args.push(format!("-parallelism={parallelism}"));
    }
    for target in &options.targets {
        args.push(format!("-target={target}"));
    }

    args
}

fn finish(options: &Options, mut args: Vec<String>) -> Vec<String> {
    if options.no_color {
        args.push("-no-color".to_string());
    }
    args
}

// NOTE: JSON arrays and objects are valid HCL expressions, strings are passed raw.
fn var_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
