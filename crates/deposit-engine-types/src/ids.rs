//! Newtype identifiers so a `DepositId` and a `SubmissionId` can never be
//! confused at a call site, even though both wrap a plain string URI.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_newtype!(SubmissionId);
id_newtype!(DepositId);
id_newtype!(RepositoryId);
id_newtype!(RepositoryCopyId);
id_newtype!(FileId);
id_newtype!(PublicationId);
id_newtype!(GrantId);
id_newtype!(PersonId);
