use http::uri::PathAndQuery;
use prost_reflect::{DescriptorPool, MessageDescriptor, MethodDescriptor};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid full method name (expected 'pkg.Service/Method'): {0}")]
    InvalidFullMethod(String),

    #[error("service not found in descriptors: {0}")]
    ServiceNotFound(String),

    #[error("method not found in service '{service}': {method}")]
    MethodNotFound { service: String, method: String },

    #[error("invalid method path: {0}")]
    InvalidPath(String),
}

/// The four gRPC interaction patterns, dispatched as a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CallShape {
    Unary,
    ServerStream,
    ClientStream,
    BidiStream,
}

/// A resolved method descriptor plus the rendered request path.
///
/// Descriptor resolution itself (proto files, reflection servers) happens
/// outside the engine; this type is the boundary it hands results across.
#[derive(Debug, Clone)]
pub struct GrpcMethod {
    method: MethodDescriptor,
    path: PathAndQuery,
}

impl GrpcMethod {
    pub fn new(method: MethodDescriptor) -> Result<Self> {
        let rendered = format!(
            "/{}/{}",
            method.parent_service().full_name(),
            method.name()
        );
        let path = PathAndQuery::try_from(rendered.as_str())
            .map_err(|_| Error::InvalidPath(rendered))?;

        Ok(Self { method, path })
    }

    /// Looks up `pkg.Service/Method` in an already-built descriptor pool.
    pub fn find(pool: &DescriptorPool, full_method: &str) -> Result<Self> {
        let (service_name, method_name) = full_method
            .split_once('/')
            .ok_or_else(|| Error::InvalidFullMethod(full_method.to_string()))?;

        let service = pool
            .get_service_by_name(service_name)
            .ok_or_else(|| Error::ServiceNotFound(service_name.to_string()))?;

        let method = service
            .methods()
            .find(|m| m.name() == method_name)
            .ok_or_else(|| Error::MethodNotFound {
                service: service_name.to_string(),
                method: method_name.to_string(),
            })?;

        Self::new(method)
    }

    #[must_use]
    pub fn shape(&self) -> CallShape {
        match (
            self.method.is_client_streaming(),
            self.method.is_server_streaming(),
        ) {
            (false, false) => CallShape::Unary,
            (false, true) => CallShape::ServerStream,
            (true, false) => CallShape::ClientStream,
            (true, true) => CallShape::BidiStream,
        }
    }

    #[must_use]
    pub fn input(&self) -> MessageDescriptor {
        self.method.input()
    }

    #[must_use]
    pub fn output(&self) -> MessageDescriptor {
        self.method.output()
    }

    #[must_use]
    pub fn path(&self) -> &PathAndQuery {
        &self.path
    }
}

/// Immutable description of the target call for one run. Built once before
/// the run starts and shared read-only across all workers.
#[derive(Debug, Clone)]
pub struct CallSpec {
    /// Target endpoint, e.g. `localhost:50051` or `https://host:443`.
    pub target: String,
    pub method: GrpcMethod,
    /// Metadata (header) template attached to every call.
    pub metadata: Vec<(String, String)>,
}

impl CallSpec {
    pub fn new(target: impl Into<String>, method: GrpcMethod) -> Self {
        Self {
            target: target.into(),
            method,
            metadata: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Vec<(String, String)>) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn shape(&self) -> CallShape {
        self.method.shape()
    }
}
