use serde_json::Value;

use crate::core::compound_write::CompoundWrite;
use crate::core::tree::Tree;
use crate::path::Path;
use crate::query::QueryParams;
use crate::util::assert;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    User,
    Server,
}

/// Where an operation originated. Server operations may carry the query
/// params of a tagged listen, in which case incoming data must be filtered
/// for that query.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationSource {
    pub kind: SourceKind,
    pub query_params: Option<QueryParams>,
    pub tagged: bool,
}

impl OperationSource {
    pub fn user() -> OperationSource {
        OperationSource {
            kind: SourceKind::User,
            query_params: None,
            tagged: false,
        }
    }

    pub fn server() -> OperationSource {
        OperationSource {
            kind: SourceKind::Server,
            query_params: None,
            tagged: false,
        }
    }

    pub fn new(kind: SourceKind, query_params: Option<QueryParams>, tagged: bool) -> OperationSource {
        assert(
            !tagged || kind == SourceKind::Server,
            "Tagged queries must be from the server",
        );
        OperationSource {
            kind,
            query_params,
            tagged,
        }
    }

    pub fn for_server_tagged_query(query_params: QueryParams) -> OperationSource {
        OperationSource {
            kind: SourceKind::Server,
            query_params: Some(query_params),
            tagged: true,
        }
    }

    pub fn is_from_user(&self) -> bool {
        self.kind == SourceKind::User
    }

    pub fn is_from_server(&self) -> bool {
        self.kind == SourceKind::Server
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckStatus {
    Confirm,
    Revert,
}

/// The payload of an [`Operation`].
#[derive(Clone, Debug, PartialEq)]
pub enum OperationKind {
    /// A complete value replaces whatever is at the path.
    Overwrite { snapshot: Value },
    /// A set of complete values replaces children under the path.
    Merge { children: CompoundWrite },
    /// A pending user write was resolved; `affected_tree` marks the paths the
    /// write covered (a root value for an overwrite, one entry per child for
    /// a merge).
    AckUserWrite {
        affected_tree: Tree<bool>,
        status: AckStatus,
    },
    /// The server has delivered everything under the path.
    ListenComplete,
}

/// One unit of work for the view layer: a server or user data event, an
/// acknowledgement, or a listen-complete marker, targeted at a path.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub source: OperationSource,
    pub path: Path,
    pub kind: OperationKind,
}

impl Operation {
    pub fn overwrite(source: OperationSource, path: Path, snapshot: Value) -> Operation {
        Operation {
            source,
            path,
            kind: OperationKind::Overwrite { snapshot },
        }
    }

    pub fn merge(source: OperationSource, path: Path, children: CompoundWrite) -> Operation {
        Operation {
            source,
            path,
            kind: OperationKind::Merge { children },
        }
    }

    pub fn ack_user_write(path: Path, affected_tree: Tree<bool>, status: AckStatus) -> Operation {
        Operation {
            source: OperationSource::user(),
            path,
            kind: OperationKind::AckUserWrite {
                affected_tree,
                status,
            },
        }
    }

    pub fn listen_complete(source: OperationSource, path: Path) -> Operation {
        Operation {
            source,
            path,
            kind: OperationKind::ListenComplete,
        }
    }
}
