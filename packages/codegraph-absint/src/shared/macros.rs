//! Shared macros for the codebase
//!
//! - `vm_trace!`: per-instruction logging, compiled out unless the `trace` feature is on
//! - `define_index!`: integer-index newtypes for arena-allocated records
//! - `define_opcodes!`: the closed opcode enum and its mnemonic table

/// Per-instruction trace logging - no-op when trace feature is disabled
#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! vm_trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "trace")]
#[macro_export]
macro_rules! vm_trace {
    ($($arg:tt)*) => {
        ::tracing::trace!($($arg)*)
    };
}

/// Declare a `u32` index newtype addressing an arena slot
#[macro_export]
macro_rules! define_index {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            /// Arena slot of this id
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Id of the given arena slot
            #[inline]
            pub fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

/// Declare the opcode enum together with its mnemonic mapping
#[macro_export]
macro_rules! define_opcodes {
    ($($variant:ident => $mnemonic:literal,)*) => {
        /// Decoded instruction kind; the closed set the dispatcher handles
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            /// Every opcode, in declaration order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            /// Canonical mnemonic
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            /// Look up a mnemonic; `None` for anything outside the table
            pub fn from_mnemonic(s: &str) -> Option<Self> {
                match s {
                    $($mnemonic => Some(Opcode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}
