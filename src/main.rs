//! toolhost command-line interface.
//!
//! Every command prints JSON on stdout. Logs go to stderr.

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::error::Error;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use toolhost::config::{self, ToolhostConfig};
use toolhost::logging::{init_and_store_logging, LogLevel};
use toolhost::tools::{
    metadata, module_id, CallContext, CodeValidator, ExecutionRouter, HostExecutor, ToolCatalog,
    ToolInfo, WorkerPool,
};

#[derive(Parser, Debug)]
#[command(name = "toolhost", version, about = "Validate and run LLM tool calls")]
struct Cli {
    /// Configuration file (default: ./toolhost.toml, then the XDG config dir)
    #[arg(short, long, global = true, env = "TOOLHOST_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, value_enum, ignore_case = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a code file and print the findings
    Validate {
        /// File to validate, or `-` for stdin
        file: PathBuf,

        /// Only check syntax
        #[arg(long)]
        syntax_only: bool,
    },

    /// Scan a tools directory and print the catalog
    Scan {
        /// Tools directory (default: `tools_dir` from the configuration)
        dir: Option<PathBuf>,
    },

    /// Call one function in a tool file
    Call {
        /// Tool file
        file: PathBuf,

        /// Function to call
        function: String,

        /// Keyword arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Per-call configuration as a JSON object
        #[arg(long, default_value = "{}")]
        tool_config: String,

        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Validate code and run the tool call it contains
    Run {
        /// Code to run, or `-` for stdin
        code: String,

        /// Tools directory (default: `tools_dir` from the configuration)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let mut settings = match &cli.config {
        Some(path) => config::from_path(path)?,
        None => config::load()?,
    };
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    init_and_store_logging(&settings.logging)?;

    match cli.command {
        Command::Validate { file, syntax_only } => validate(&settings, &file, syntax_only),
        Command::Scan { dir } => scan(&tools_dir(&settings, dir)?),
        Command::Call {
            file,
            function,
            args,
            tool_config,
            timeout,
        } => {
            let kwargs = parse_object("--args", &args)?;
            let tool_config = parse_object("--tool-config", &tool_config)?;
            call(&settings, &file, &function, kwargs, tool_config, timeout).await
        }
        Command::Run { code, dir, timeout } => {
            let code = read_input(&code)?;
            let dir = tools_dir(&settings, dir)?;
            run_code(&settings, &dir, &code, timeout).await
        }
    }
}

fn tools_dir(settings: &ToolhostConfig, dir: Option<PathBuf>) -> Result<PathBuf, Box<dyn Error>> {
    dir.or_else(|| settings.tools_dir.clone())
        .ok_or_else(|| "no tools directory given and none configured (set tools_dir)".into())
}

fn read_input(source: &str) -> Result<String, Box<dyn Error>> {
    if source == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(source.to_string())
    }
}

fn parse_object(flag: &str, text: &str) -> Result<Map<String, Value>, Box<dyn Error>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(format!("{flag} must be a JSON object").into()),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn validate(
    settings: &ToolhostConfig,
    file: &Path,
    syntax_only: bool,
) -> Result<ExitCode, Box<dyn Error>> {
    let code = if file == Path::new("-") {
        read_input("-")?
    } else {
        std::fs::read_to_string(file)?
    };
    let validator = CodeValidator::from_config(&settings.security);
    let result = validator.validate_with(&code, !syntax_only);
    print_json(&result)?;
    Ok(status(result.valid))
}

fn scan(dir: &Path) -> Result<ExitCode, Box<dyn Error>> {
    let catalog = ToolCatalog::discover(dir)?;
    let tools: Vec<Value> = catalog
        .entries()
        .map(|entry| {
            json!({
                "name": entry.info.name,
                "module": entry.info.module,
                "function": entry.info.function,
                "signature": entry.info.signature,
                "file": entry.info.file,
                "isolation": entry.isolation,
            })
        })
        .collect();
    let failures: Vec<Value> = catalog
        .failures()
        .iter()
        .map(|(file, reason)| json!({ "file": file, "reason": reason }))
        .collect();
    print_json(&json!({ "tools": tools, "failures": failures }))?;
    Ok(ExitCode::SUCCESS)
}

fn router(settings: &ToolhostConfig, catalog: ToolCatalog) -> Result<ExecutionRouter, Box<dyn Error>> {
    let pool = WorkerPool::new(settings.worker.to_pool_config())?;
    let mut host = HostExecutor::new();
    if let Some(dir) = catalog.tools_dir() {
        host = host.with_tools_dir(dir);
    }
    Ok(ExecutionRouter::new(
        catalog,
        CodeValidator::from_config(&settings.security),
        host,
        pool,
    ))
}

async fn call(
    settings: &ToolhostConfig,
    file: &Path,
    function: &str,
    kwargs: Map<String, Value>,
    tool_config: Map<String, Value>,
    timeout: Option<u64>,
) -> Result<ExitCode, Box<dyn Error>> {
    let parent = file.parent().unwrap_or_else(|| Path::new("."));
    let content = std::fs::read_to_string(file)?;
    let signature = metadata::function_defs(&content)
        .into_iter()
        .find(|def| def.name == function)
        .map(|def| def.params)
        .unwrap_or_default();
    let info = ToolInfo::new(module_id(parent, file), function)
        .with_file(file)
        .with_signature(signature);

    let router = router(settings, ToolCatalog::new())?;
    let mut ctx = CallContext::new().with_config(tool_config);
    if let Some(secs) = timeout {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    let result = router.call(&info, kwargs, ctx).await;
    router.shutdown().await;
    print_json(&result)?;
    Ok(status(result.success))
}

async fn run_code(
    settings: &ToolhostConfig,
    dir: &Path,
    code: &str,
    timeout: Option<u64>,
) -> Result<ExitCode, Box<dyn Error>> {
    let router = router(settings, ToolCatalog::discover(dir)?)?;
    let mut ctx = CallContext::new();
    if let Some(secs) = timeout {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    let result = router.run_code(code, ctx).await;
    router.shutdown().await;
    print_json(&result)?;
    Ok(status(result.success))
}
