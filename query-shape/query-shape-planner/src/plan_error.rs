use arcstr::ArcStr;
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("`{name}` is an open property of `{type_name}` and cannot be expanded")]
    OpenPropertyExpansion { type_name: ArcStr, name: ArcStr },
    #[error("`{name}` on `{type_name}` is not a relationship and cannot be expanded")]
    NotARelationship { type_name: ArcStr, name: ArcStr },
    #[error("property `{name}` not found on `{type_name}`")]
    PropertyNotFound { type_name: ArcStr, name: ArcStr },
    #[error("unknown resource type `{0:?}`")]
    UnknownType(query_shape_model::TypeId),
    #[error("cannot infer the value type of ordering key {index} of `{path}`")]
    UninferableOrderKey { path: ArcStr, index: usize },
    #[error("wrapper for `{path}` needs {required} slots, at most {limit} are supported")]
    WrapperTooWide {
        path: ArcStr,
        required: usize,
        limit: usize,
    },
}

/// How an error should be reported to whoever issued the request
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ErrorClass {
    /// The request is malformed with respect to the metadata
    BadRequest,
    /// The request is well-formed, but exceeds what the planner supports
    Unsupported,
}

impl PlanError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::OpenPropertyExpansion { .. }
            | Self::NotARelationship { .. }
            | Self::PropertyNotFound { .. }
            | Self::UnknownType(_)
            | Self::UninferableOrderKey { .. } => ErrorClass::BadRequest,
            Self::WrapperTooWide { .. } => ErrorClass::Unsupported,
        }
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
