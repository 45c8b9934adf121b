//! A small library to parse command-line and environmental flags.
//!
//! Flags are registered from module constructors (see [`define_flag!`]) and
//! parsed once at startup, before any mutator thread runs. Values are plain
//! statics written during parsing; reading them afterwards is data-race free
//! because parsing happens strictly before the values are consumed.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[doc(hidden)]
pub use ctor::ctor;
#[doc(hidden)]
pub use paste;

pub type OptionHandler = fn(&str);

enum FlagValue {
    Bool(*mut bool),
    Usize(*mut usize),
    Isize(*mut isize),
    F64(*mut f64),
    String(*mut String),
    Handler(OptionHandler),
}

// Raw pointers to flag statics; the statics live for the program lifetime and
// are only written while parsing.
unsafe impl Send for FlagValue {}

struct Flag {
    name: &'static str,
    #[allow(dead_code)]
    comment: &'static str,
    value: FlagValue,
    is_set: AtomicBool,
}

impl Flag {
    fn set_from_str(&self, argument: &str) -> bool {
        let parsed = match &self.value {
            FlagValue::Bool(addr) => match argument {
                "true" => unsafe {
                    **addr = true;
                    true
                },
                "false" => unsafe {
                    **addr = false;
                    true
                },
                _ => false,
            },
            FlagValue::Usize(addr) => match parse_int::<usize>(argument) {
                Some(value) => unsafe {
                    **addr = value;
                    true
                },
                None => false,
            },
            FlagValue::Isize(addr) => match parse_int::<isize>(argument) {
                Some(value) => unsafe {
                    **addr = value;
                    true
                },
                None => false,
            },
            FlagValue::F64(addr) => match argument.parse::<f64>() {
                Ok(value) => unsafe {
                    **addr = value;
                    true
                },
                Err(_) => false,
            },
            FlagValue::String(addr) => unsafe {
                **addr = argument.to_owned();
                true
            },
            FlagValue::Handler(handler) => {
                handler(argument);
                true
            }
        };

        if parsed {
            self.is_set.store(true, Ordering::Relaxed);
        }
        parsed
    }
}

trait ParseRadix: Sized {
    fn from_str_radix(src: &str, radix: u32) -> Result<Self, std::num::ParseIntError>;
}

impl ParseRadix for usize {
    fn from_str_radix(src: &str, radix: u32) -> Result<Self, std::num::ParseIntError> {
        usize::from_str_radix(src, radix)
    }
}

impl ParseRadix for isize {
    fn from_str_radix(src: &str, radix: u32) -> Result<Self, std::num::ParseIntError> {
        isize::from_str_radix(src, radix)
    }
}

fn parse_int<T: ParseRadix>(argument: &str) -> Option<T> {
    let (digits, radix) = if let Some(hex) = argument.strip_prefix("0x") {
        (hex, 16)
    } else if argument.len() > 1 && argument.starts_with('0') {
        (&argument[1..], 8)
    } else {
        (argument, 10)
    };

    T::from_str_radix(digits, radix).ok()
}

static REGISTRY: Mutex<Vec<Flag>> = Mutex::new(Vec::new());

fn register(name: &'static str, comment: &'static str, value: FlagValue) {
    let mut registry = REGISTRY.lock();
    if registry.iter().any(|flag| flag.name == name) {
        return;
    }
    registry.push(Flag {
        name,
        comment,
        value,
        is_set: AtomicBool::new(false),
    });
}

/// Was the named flag explicitly set by the command line or environment?
pub fn is_set(name: &str) -> bool {
    REGISTRY
        .lock()
        .iter()
        .find(|flag| flag.name == name)
        .is_some_and(|flag| flag.is_set.load(Ordering::Relaxed))
}

#[derive(Debug, Error)]
pub enum FlagError {
    #[error("unknown flag: {0}")]
    UnknownFlag(String),
    #[error("invalid value `{value}` for flag {name}")]
    InvalidValue { name: String, value: String },
}

/// Parses environment variables, then command-line arguments (the command
/// line wins). Environment variables are matched as `LOCKKIT_<NAME>`;
/// command-line flags as `--name=value`, `--name` and `--no-name`.
pub fn parse(
    args: impl Iterator<Item = String>,
    vars: impl Iterator<Item = (String, String)>,
) -> Result<(), FlagError> {
    const ENV_PREFIX: &str = "LOCKKIT_";

    for (name, value) in vars {
        if let Some(name) = name.strip_prefix(ENV_PREFIX) {
            // Unknown environment variables are ignored: the process
            // environment is shared with the embedding runtime.
            let _ = set_flag(&name.to_lowercase(), &value);
        }
    }

    for arg in args {
        let Some(option) = arg.strip_prefix("--") else {
            continue;
        };

        let (name, argument) = match option.split_once('=') {
            Some((name, argument)) => (name.to_owned(), argument.to_owned()),
            None => match option.strip_prefix("no-").or_else(|| option.strip_prefix("no_")) {
                Some(name) => (name.to_owned(), "false".to_owned()),
                None => (option.to_owned(), "true".to_owned()),
            },
        };

        set_flag(&name.replace('-', "_"), &argument)?;
    }

    Ok(())
}

fn set_flag(name: &str, argument: &str) -> Result<(), FlagError> {
    let registry = REGISTRY.lock();
    let Some(flag) = registry.iter().find(|flag| flag.name == name) else {
        return Err(FlagError::UnknownFlag(name.to_owned()));
    };

    if !flag.set_from_str(argument) {
        return Err(FlagError::InvalidValue {
            name: name.to_owned(),
            value: argument.to_owned(),
        });
    }

    Ok(())
}

/// # Safety
///
/// `addr` must be valid for the program lifetime.
#[doc(hidden)]
pub unsafe fn register_bool(addr: *mut bool, name: &'static str, comment: &'static str) {
    register(name, comment, FlagValue::Bool(addr));
}

/// # Safety
///
/// `addr` must be valid for the program lifetime.
#[doc(hidden)]
pub unsafe fn register_usize(addr: *mut usize, name: &'static str, comment: &'static str) {
    register(name, comment, FlagValue::Usize(addr));
}

/// # Safety
///
/// `addr` must be valid for the program lifetime.
#[doc(hidden)]
pub unsafe fn register_isize(addr: *mut isize, name: &'static str, comment: &'static str) {
    register(name, comment, FlagValue::Isize(addr));
}

/// # Safety
///
/// `addr` must be valid for the program lifetime.
#[doc(hidden)]
pub unsafe fn register_f64(addr: *mut f64, name: &'static str, comment: &'static str) {
    register(name, comment, FlagValue::F64(addr));
}

/// # Safety
///
/// `addr` must be valid for the program lifetime.
#[doc(hidden)]
pub unsafe fn register_string(addr: *mut String, name: &'static str, comment: &'static str) {
    register(name, comment, FlagValue::String(addr));
}

#[doc(hidden)]
pub fn register_handler(handler: OptionHandler, name: &'static str, comment: &'static str) {
    register(name, comment, FlagValue::Handler(handler));
}

/// Defines a flag backed by a static, registered at program startup.
///
/// `define_flag!(usize, pool_size, 50, "...")` generates a `pool_size()`
/// accessor and an `is_pool_size_set()` query.
#[macro_export]
macro_rules! define_flag {
    ($typ:ident, $name:ident, $default_value:expr, $comment:literal) => {
        paste::paste! {
            #[doc(hidden)]
            static mut [<FLAG_ $name:upper>]: $typ = $default_value;

            #[doc(hidden)]
            #[ctor::ctor]
            fn [<register_ $name _flag>]() {
                unsafe {
                    $crate::utils::flags::[<register_ $typ:lower>](
                        std::ptr::addr_of_mut!([<FLAG_ $name:upper>]),
                        stringify!($name),
                        $comment,
                    );
                }
            }

            #[doc = $comment]
            pub fn $name() -> $typ {
                unsafe { (*std::ptr::addr_of!([<FLAG_ $name:upper>])).clone() }
            }

            pub fn [<is_ $name _set>]() -> bool {
                $crate::utils::flags::is_set(stringify!($name))
            }
        }
    };
}

/// Defines a flag whose value is forwarded to a handler function at parse
/// time instead of being stored.
#[macro_export]
macro_rules! define_option_handler {
    ($handler:expr, $name:ident, $comment:literal) => {
        paste::paste! {
            #[doc(hidden)]
            #[ctor::ctor]
            fn [<register_ $name _flag>]() {
                $crate::utils::flags::register_handler($handler, stringify!($name), $comment);
            }

            pub fn [<is_ $name _set>]() -> bool {
                $crate::utils::flags::is_set(stringify!($name))
            }
        }
    };
}
