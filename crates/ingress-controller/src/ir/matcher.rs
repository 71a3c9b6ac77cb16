#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathType {
    Exact,
    Prefix,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StringMatch {
    Exact(String),
    Regex(String),
}

/// Header or query parameter constraint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueMatch {
    pub name: String,
    pub value: StringMatch,
}

impl ValueMatch {
    pub fn exact(name: impl Into<String>, value: impl Into<String>) -> Self {
        ValueMatch {
            name: name.into(),
            value: StringMatch::Exact(value.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IrHttpMatch {
    pub path: String,
    pub path_type: PathType,
    pub headers: Vec<ValueMatch>,
    pub query_params: Vec<ValueMatch>,
    pub method: Option<String>,
}

impl IrHttpMatch {
    pub fn prefix(path: impl Into<String>) -> Self {
        IrHttpMatch {
            path: path.into(),
            path_type: PathType::Prefix,
            headers: Vec::new(),
            query_params: Vec::new(),
            method: None,
        }
    }

    pub fn exact(path: impl Into<String>) -> Self {
        IrHttpMatch {
            path_type: PathType::Exact,
            ..IrHttpMatch::prefix(path)
        }
    }

    pub fn regex(path: impl Into<String>) -> Self {
        IrHttpMatch {
            path_type: PathType::Regex,
            ..IrHttpMatch::prefix(path)
        }
    }

    pub fn with_header(mut self, header: ValueMatch) -> Self {
        self.headers.push(header);
        self
    }

    pub fn with_query_param(mut self, param: ValueMatch) -> Self {
        self.query_params.push(param);
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Whether only the path constrains this match.
    pub fn is_path_only(&self) -> bool {
        self.headers.is_empty() && self.query_params.is_empty() && self.method.is_none()
    }
}
