//! HTTP method codes

use crate::error::{Result, WireError};
use std::fmt;
use std::str::FromStr;

macro_rules! methods {
    ($($variant:ident = $code:literal => $name:literal),+ $(,)?) => {
        /// HTTP methods with a protocol code
        ///
        /// Methods outside this table cannot be forwarded.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Method {
            $(
                #[doc = $name]
                $variant = $code,
            )+
        }

        impl Method {
            /// Every method, in code order
            pub const ALL: &[Self] = &[$(Self::$variant),+];

            /// Protocol code
            #[must_use]
            pub const fn code(self) -> u8 {
                self as u8
            }

            /// Method name as sent on the HTTP request line
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            /// Look up a method by its protocol code
            pub const fn from_code(code: u8) -> Result<Self> {
                match code {
                    $($code => Ok(Self::$variant),)+
                    other => Err(WireError::UnknownMethodCode(other)),
                }
            }
        }

        impl FromStr for Method {
            type Err = WireError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(WireError::UnknownMethod(other.to_string())),
                }
            }
        }
    };
}

methods! {
    Options = 1 => "OPTIONS",
    Get = 2 => "GET",
    Head = 3 => "HEAD",
    Post = 4 => "POST",
    Put = 5 => "PUT",
    Delete = 6 => "DELETE",
    Trace = 7 => "TRACE",
    Propfind = 8 => "PROPFIND",
    Proppatch = 9 => "PROPPATCH",
    Mkcol = 10 => "MKCOL",
    Copy = 11 => "COPY",
    Move = 12 => "MOVE",
    Lock = 13 => "LOCK",
    Unlock = 14 => "UNLOCK",
    Acl = 15 => "ACL",
    Report = 16 => "REPORT",
    VersionControl = 17 => "VERSION-CONTROL",
    Checkin = 18 => "CHECKIN",
    Checkout = 19 => "CHECKOUT",
    Uncheckout = 20 => "UNCHECKOUT",
    Search = 21 => "SEARCH",
    Mkworkspace = 22 => "MKWORKSPACE",
    Update = 23 => "UPDATE",
    Label = 24 => "LABEL",
    Merge = 25 => "MERGE",
    BaselineControl = 26 => "BASELINE-CONTROL",
    Mkactivity = 27 => "MKACTIVITY",
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_method_table() {
        assert_eq!(Method::ALL.len(), 27);
        for (i, method) in Method::ALL.iter().enumerate() {
            assert_eq!(usize::from(method.code()), i + 1);
            assert_eq!(Method::from_code(method.code()).unwrap(), *method);
            assert_eq!(method.as_str().parse::<Method>().unwrap(), *method);
        }
    }

    #[test]
    fn test_well_known_codes() {
        assert_eq!(Method::Get.code(), 2);
        assert_eq!(Method::Post.code(), 4);
        assert_eq!("BASELINE-CONTROL".parse::<Method>().unwrap().code(), 26);
    }

    #[test]
    fn test_unknown_methods() {
        assert!(matches!(
            "BREW".parse::<Method>(),
            Err(WireError::UnknownMethod(m)) if m == "BREW"
        ));
        // Method names are case-sensitive
        assert!("get".parse::<Method>().is_err());
        assert!(matches!(Method::from_code(0), Err(WireError::UnknownMethodCode(0))));
        assert!(Method::from_code(28).is_err());
    }
}
