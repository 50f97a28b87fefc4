#![forbid(unsafe_code)]

use anyhow::{Result, anyhow};
use log::{info, error, warn, LevelFilter};
use serde::Deserialize;
use std::{env, fs, path::Path};
use toml;
use fs_mistrust::Mistrust;
use std::os::unix::fs::PermissionsExt;
use lazy_static::lazy_static;
use structopt::StructOpt;

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;

// Intake utilities.
use crate::utils::{intake_utils, store, errors::Errors};
use crate::utils::store::ApplicationStore;

use super::intake_utils::get_absolute_path;

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Directory and file locations. Unless otherwise noted, all files and directories
// are relative to the root directory.
const ENV_INTAKE_ROOT_DIR  : &str = "INTAKE_ROOT_DIR";
const DEFAULT_ROOT_DIR     : &str = "~/.intake";
const CONFIG_DIR           : &str = "/config";
const LOGS_DIR             : &str = "/logs";
const DATA_DIR             : &str = "/data";
const STATIC_DIR           : &str = "/static";
const LOG4RS_CONFIG_FILE   : &str = "/log4rs.yml";    // relative to config dir
const INTAKE_CONFIG_FILE   : &str = "/intake.toml";   // relative to config dir

// Networking.
const ENV_HTTP_PORT        : &str = "PORT";
const DEFAULT_HTTP_ADDR    : &str = "http://localhost";
const DEFAULT_HTTP_PORT    : u16  = 3000;

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Assign the command line arguments BEFORE RUNTIME_CTX is initialized in lib.rs.
lazy_static! {
    pub static ref INTAKE_ARGS: IntakeArgs = init_intake_args();
}

// Calculate the data directories BEFORE RUNTIME_CTX is initialized in lib.rs.
lazy_static! {
    pub static ref INTAKE_DIRS: IntakeDirs = init_intake_dirs();
}

// ***************************************************************************
//                             Directory Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// IntakeDirs:
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
pub struct IntakeDirs {
    pub root_dir: String,
    pub config_dir: String,
    pub logs_dir: String,
    pub data_dir: String,
    pub static_dir: String,
}

// ***************************************************************************
//                               Config Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// CommandLineArgs:
// ---------------------------------------------------------------------------
#[derive(Debug, StructOpt)]
#[structopt(name = "intake_args", about = "Command line arguments for the intake server.")]
pub struct IntakeArgs {
    /// Specify the server's root data directory.
    ///
    /// This directory contains all the files the server uses during execution.
    #[structopt(short, long)]
    pub root_dir: Option<String>,

    /// Create the data directories and then exit.
    ///
    /// The data directories will be rooted at a root directory calculated
    /// using the following priority order:
    ///
    ///   1. If set, the value of the INTAKE_ROOT_DIR environment variable,
    ///
    ///   2. Otherwise, if set, the value of the --root_dir command line argument,
    ///
    ///   3. Otherwise, ~/.intake
    ///
    #[structopt(short, long)]
    pub create_dirs_only: bool,
}

// ---------------------------------------------------------------------------
// Parms:
// ---------------------------------------------------------------------------
#[derive(Debug)]
pub struct Parms {
    pub config_file: String,
    pub config: Config,
}

// ---------------------------------------------------------------------------
// RuntimeCtx:
// ---------------------------------------------------------------------------
#[derive(Debug)]
pub struct RuntimeCtx {
    pub parms: Parms,
    pub store: ApplicationStore,
    pub intake_args: &'static IntakeArgs,
    pub intake_dirs: &'static IntakeDirs,
}

// ---------------------------------------------------------------------------
// Config:
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
pub struct Config {
    pub title: String,
    pub http_addr: String,
    pub http_port: u16,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Intake Server".to_string(),
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

// ***************************************************************************
//                            Directory Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_intake_args:
// ---------------------------------------------------------------------------
/** Get the command line arguments. */
fn init_intake_args() -> IntakeArgs {
    let args = IntakeArgs::from_args();
    println!("{:?}", args);
    args
}

// ---------------------------------------------------------------------------
// init_intake_dirs:
// ---------------------------------------------------------------------------
/** Calculate the external data directories.  Each directory is created with
 * owner-only permissions if it does not already exist.
 */
fn init_intake_dirs() -> IntakeDirs {
    // The root directory location drives everything else.
    let root_dir = get_root_dir();

    // Initialize the mistrust object.  Everything above the root directory
    // is outside our control and not checked.
    let mistrust = get_mistrust(&root_dir);

    // Check that each path is absolute and is a directory with the
    // proper permission assign if it exists.  If it doesn't exist,
    // create it.
    check_intake_dir(&root_dir, "root directory", &mistrust);

    let config_dir = root_dir.clone() + CONFIG_DIR;
    check_intake_dir(&config_dir, "config directory", &mistrust);

    let logs_dir = root_dir.clone() + LOGS_DIR;
    check_intake_dir(&logs_dir, "logs directory", &mistrust);

    let data_dir = root_dir.clone() + DATA_DIR;
    check_intake_dir(&data_dir, "data directory", &mistrust);

    let static_dir = root_dir.clone() + STATIC_DIR;
    check_intake_dir(&static_dir, "static directory", &mistrust);

    // Package up and return the directories.
    IntakeDirs {
        root_dir, config_dir, logs_dir, data_dir, static_dir,
    }
}

// ---------------------------------------------------------------------------
// check_intake_dir:
// ---------------------------------------------------------------------------
/** Check that the path is absolute and, if it exists, that is has the proper
 * permissions assigned.  If it doesn't exist, create it.  The mistrust package
 * creates directories with 0o700 permissions.
 *
 * Any failure results in a panic.
 */
fn check_intake_dir(dir: &String, msgname: &str, mistrust: &Mistrust) {
    // Get the path object.
    let path = Path::new(dir);
    if !path.is_absolute() {
        panic!("The intake server {} path must be absolute: {}", msgname, dir);
    }
    if path.exists() {
        // Make sure the path represents a directory.
        if !path.is_dir() {
            panic!("The intake server {} path must be a directory: {}", msgname, dir);
        }

        // Make sure the directory had rwx for owner only.
        let meta = path.metadata().unwrap_or_else(|_| panic!("Unable to read metadata for {}: {}", msgname, dir));
        let perm = meta.permissions().mode();
        if perm & 0o777 != 0o700 {
            panic!("The intake server {} path must be have 0o700 permissions: {}", msgname, dir);
        }
    } else {
        // Create the directory with the correct permissions.
        match mistrust.make_directory(path) {
            Ok(_) => (),
            Err(e) => {
                panic!("Make directory error for {:?}: {}", path, &e.to_string());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// get_mistrust:
// ---------------------------------------------------------------------------
/** Configure a new mistrust object for initial directory processing.  Only
 * the root directory and its children are held to the permission rules; the
 * chain of ancestors above the root is ignored.
 */
fn get_mistrust(root_dir: &str) -> Mistrust {
    // The parent of the root directory bounds the permission checks.
    let ignore_prefix = match Path::new(root_dir).parent() {
        Some(parent) => parent.to_path_buf(),
        None => Path::new("/").to_path_buf(),
    };

    // Configure our mistrust object.
    let mistrust = match Mistrust::builder()
        .ignore_prefix(ignore_prefix)
        .trust_group(0)
        .build() {
            Ok(m) => m,
            Err(e) => {
                panic!("Mistrust configuration error: {}", &e.to_string());
            }
        };
    mistrust
}

// ---------------------------------------------------------------------------
// get_root_dir:
// ---------------------------------------------------------------------------
fn get_root_dir() -> String {
    // Order of precedence:
    //  1. Environment variable
    //  2. Command line --root-dir argument
    //  3. Default location
    //
    let root_dir = env::var(ENV_INTAKE_ROOT_DIR).unwrap_or_else(
        |_| {
            match INTAKE_ARGS.root_dir.clone() {
                Some(r) => r,
                None => DEFAULT_ROOT_DIR.to_string(),
            }
        });

    // Canonicalize the path.
    get_absolute_path(&root_dir)
}

// ***************************************************************************
//                               Log Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_log:
// ---------------------------------------------------------------------------
/** Initialize log4rs logging.  A log4rs.yml file in the config directory
 * takes precedence; without one the server logs to the console at INFO.
 */
pub fn init_log() {
    let logconfig = init_log_config();
    if Path::new(&logconfig).exists() {
        match log4rs::init_file(logconfig.clone(), Default::default()) {
            Ok(_) => (),
            Err(e) => {
                println!("{}", e);
                let s = format!("{}", Errors::Log4rsInitialization(logconfig.clone()));
                panic!("{}", s);
            },
        }
        info!("Log4rs initialized using: {}", logconfig);
    } else {
        init_console_log();
        info!("Log4rs initialized with console defaults, no file at: {}", logconfig);
    }
}

// ---------------------------------------------------------------------------
// init_console_log:
// ---------------------------------------------------------------------------
fn init_console_log() {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%dT%H:%M:%S%.6fZ)(utc)} {l} {t} - {m}{n}")))
        .build();
    let config = log4rs::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .expect("Unable to assemble the default log configuration.");
    log4rs::init_config(config).expect("Unable to initialize console logging.");
}

// ---------------------------------------------------------------------------
// init_log_config:
// ---------------------------------------------------------------------------
fn init_log_config() -> String {
    INTAKE_DIRS.config_dir.clone() + LOG4RS_CONFIG_FILE
}

/// ***************************************************************************
//                             Parms Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// get_parms:
// ---------------------------------------------------------------------------
/** Retrieve the application parameters from the configuration file in the
 * config directory.  If the file cannot be read, default values are used.
 * The PORT environment variable overrides the configured listen port in
 * either case.
 */
fn get_parms() -> Result<Parms> {
    // Get the config file path from its data directory.
    let config_file = INTAKE_DIRS.config_dir.clone() + INTAKE_CONFIG_FILE;

    // Read the cofiguration file.
    let config_file_abs = intake_utils::get_absolute_path(&config_file);
    info!("{}", Errors::ReadingConfigFile(config_file_abs.clone()));
    let contents = match fs::read_to_string(&config_file_abs) {
        Ok(c) => c,
        Err(_) => {
            println!("Unable to read configuration at {}. Using default values.", config_file);
            let mut config = Config::new();
            apply_env_overrides(&mut config);
            return Ok(Parms { config_file: Default::default(), config });
        }
    };

    // Parse the toml configuration.
    let mut config : Config = match toml::from_str(&contents) {
        Ok(c)  => c,
        Err(e) => {
            let msg = format!("{}\n   {}", Errors::TOMLParseError(config_file_abs), e);
            error!("{}", msg);
            return Result::Err(anyhow!(msg));
        }
    };

    apply_env_overrides(&mut config);
    Ok(Parms { config_file: config_file_abs, config })
}

// ---------------------------------------------------------------------------
// apply_env_overrides:
// ---------------------------------------------------------------------------
/** Environment settings win over file settings. */
fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = env::var(ENV_HTTP_PORT) {
        match val.parse::<u16>() {
            Ok(port) => config.http_port = port,
            Err(_) => warn!("Ignoring non-numeric {} value: {}", ENV_HTTP_PORT, val),
        }
    }
}

// ***************************************************************************
//                             Config Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_runtime_context:
// ---------------------------------------------------------------------------
pub fn init_runtime_context() -> RuntimeCtx {
    // If either of these fail the application aborts.
    let parms = get_parms().expect("FAILED to read configuration file.");
    let store = store::init_store().expect("FAILED to initialize the application store.");
    RuntimeCtx {parms, store, intake_args: &INTAKE_ARGS, intake_dirs: &INTAKE_DIRS}
}
