//! The name ladder: every entity is addressed by a composite key rooted in
//! its namespace.

/// Uniquely identifies an account: a namespace plus the account name.
pub trait AccountName {
    /// The namespace's name, never empty.
    fn ns(&self) -> &str;

    /// The account's name, never empty.
    fn account(&self) -> &str;
}

/// Extends [`AccountName`] with an end-user name.
pub trait UserName: AccountName {
    fn user(&self) -> &str;
}

/// Extends [`UserName`] with an optional service subtype.
pub trait ContainerName: UserName {
    /// Service subtype, empty when unset.
    fn service_type(&self) -> &str;
}

/// Extends [`ContainerName`] with the object path, an optional explicit
/// content id and an optional version (0 selects the latest).
pub trait ObjectName: ContainerName {
    fn path(&self) -> &str;

    /// Explicit content id; when set it supersedes the proxy-assigned one.
    fn id(&self) -> &str;

    fn version(&self) -> u64;
}

/// One value type implementing the whole ladder.
#[derive(Debug, Clone, Default)]
pub struct FlatName {
    pub ns: String,
    pub account: String,
    pub user: String,
    pub service_type: String,
    pub path: String,
    pub id: String,
    pub version: u64,
}

impl FlatName {
    pub fn user(ns: &str, account: &str, user: &str) -> FlatName {
        FlatName {
            ns: ns.to_string(),
            account: account.to_string(),
            user: user.to_string(),
            ..FlatName::default()
        }
    }

    pub fn object(ns: &str, account: &str, user: &str, path: &str) -> FlatName {
        FlatName {
            path: path.to_string(),
            ..FlatName::user(ns, account, user)
        }
    }
}

impl AccountName for FlatName {
    fn ns(&self) -> &str {
        &self.ns
    }
    fn account(&self) -> &str {
        &self.account
    }
}

impl UserName for FlatName {
    fn user(&self) -> &str {
        &self.user
    }
}

impl ContainerName for FlatName {
    fn service_type(&self) -> &str {
        &self.service_type
    }
}

impl ObjectName for FlatName {
    fn path(&self) -> &str {
        &self.path
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
}

/// An object name assembled from a committed content and its container, used
/// when the create call must address the proxy-assigned id and version.
pub(crate) struct QualifiedContent<'a> {
    pub container: &'a dyn ObjectName,
    pub name: &'a str,
    pub id: &'a str,
    pub version: u64,
}

impl AccountName for QualifiedContent<'_> {
    fn ns(&self) -> &str {
        self.container.ns()
    }
    fn account(&self) -> &str {
        self.container.account()
    }
}

impl UserName for QualifiedContent<'_> {
    fn user(&self) -> &str {
        self.container.user()
    }
}

impl ContainerName for QualifiedContent<'_> {
    fn service_type(&self) -> &str {
        self.container.service_type()
    }
}

impl ObjectName for QualifiedContent<'_> {
    fn path(&self) -> &str {
        self.name
    }
    fn id(&self) -> &str {
        self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
}
