//! Parser for the binary-compatibility-validator `.api` dump.
//!
//! ```text
//! public final class com/example/Foo : java/lang/Object {
//! 	public fun <init> ()V
//! 	public final fun bar (Ljava/lang/String;)I
//! 	public static final field CONST Ljava/lang/String;
//! }
//! ```

use std::path::Path;

use crate::error::EngineError;

/// What kind of type a class header declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Annotation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiMember {
    Constructor {
        modifiers: Vec<String>,
        params: Vec<String>,
    },
    Method {
        modifiers: Vec<String>,
        name: String,
        params: Vec<String>,
        returns: String,
    },
    Field {
        modifiers: Vec<String>,
        name: String,
        ty: String,
    },
}

impl ApiMember {
    pub fn modifiers(&self) -> &[String] {
        match self {
            Self::Constructor { modifiers, .. }
            | Self::Method { modifiers, .. }
            | Self::Field { modifiers, .. } => modifiers,
        }
    }
}

/// One class of the dump, with Java-style names and types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiClass {
    /// Dotted binary name, e.g. `com.example.Foo$Bar`.
    pub name: String,
    pub kind: ClassKind,
    pub modifiers: Vec<String>,
    pub members: Vec<ApiMember>,
}

impl ApiClass {
    /// Name after the last package separator, as used for constructors.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiDump {
    pub classes: Vec<ApiClass>,
}

impl ApiDump {
    /// Read and parse a dump file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a line is malformed.
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Self::parse(&text).map_err(|(line, message)| EngineError::ApiDump {
            path: path.display().to_string(),
            line,
            message,
        })
    }

    /// Parse dump text. Errors carry the 1-based line number.
    ///
    /// # Errors
    /// Returns `(line, message)` for the first malformed line.
    pub fn parse(text: &str) -> Result<Self, (usize, String)> {
        let mut classes = Vec::new();
        let mut current: Option<ApiClass> = None;

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if line == "}" {
                match current.take() {
                    Some(class) => classes.push(class),
                    None => return Err((line_no, "unexpected `}`".to_owned())),
                }
                continue;
            }

            if let Some(class) = current.as_mut() {
                let member = parse_member(line).map_err(|m| (line_no, m))?;
                class.members.push(member);
            } else {
                current = Some(parse_header(line).map_err(|m| (line_no, m))?);
            }
        }

        if let Some(class) = current {
            return Err((
                text.lines().count(),
                format!("class {} is not closed", class.name),
            ));
        }
        Ok(Self { classes })
    }
}

fn parse_header(line: &str) -> Result<ApiClass, String> {
    let Some(body) = line.strip_suffix('{') else {
        return Err(format!("expected a class header ending in `{{`, got `{line}`"));
    };
    let declaration = body.split(" : ").next().unwrap_or(body);
    let tokens: Vec<&str> = declaration.split_whitespace().collect();

    let Some(class_pos) = tokens.iter().position(|t| *t == "class") else {
        return Err(format!("class header without `class`: `{line}`"));
    };
    let Some(name) = tokens.get(class_pos + 1) else {
        return Err(format!("class header without a name: `{line}`"));
    };

    let prefix = tokens.get(..class_pos).unwrap_or_default();
    let kind = if prefix.contains(&"annotation") {
        ClassKind::Annotation
    } else if prefix.contains(&"interface") {
        ClassKind::Interface
    } else {
        ClassKind::Class
    };
    let modifiers = prefix
        .iter()
        .filter(|t| !matches!(**t, "interface" | "annotation"))
        .map(|t| (*t).to_owned())
        .collect();

    Ok(ApiClass {
        name: internal_to_java(name),
        kind,
        modifiers,
        members: Vec::new(),
    })
}

fn parse_member(line: &str) -> Result<ApiMember, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(kw_pos) = tokens.iter().position(|t| *t == "fun" || *t == "field") else {
        return Err(format!("expected `fun` or `field`: `{line}`"));
    };
    let modifiers: Vec<String> = tokens
        .get(..kw_pos)
        .unwrap_or_default()
        .iter()
        .map(|t| (*t).to_owned())
        .collect();
    let (Some(keyword), Some(name), Some(descriptor)) = (
        tokens.get(kw_pos),
        tokens.get(kw_pos + 1),
        tokens.get(kw_pos + 2),
    ) else {
        return Err(format!("incomplete member: `{line}`"));
    };

    if *keyword == "field" {
        let ty = field_type(descriptor).ok_or_else(|| format!("bad field type `{descriptor}`"))?;
        return Ok(ApiMember::Field {
            modifiers,
            name: (*name).to_owned(),
            ty,
        });
    }

    let (params, returns) =
        method_types(descriptor).ok_or_else(|| format!("bad method descriptor `{descriptor}`"))?;
    if *name == "<init>" {
        Ok(ApiMember::Constructor { modifiers, params })
    } else {
        Ok(ApiMember::Method {
            modifiers,
            name: (*name).to_owned(),
            params,
            returns,
        })
    }
}

/// `com/example/Foo$Bar` to `com.example.Foo$Bar`.
pub fn internal_to_java(name: &str) -> String {
    name.replace('/', ".")
}

/// Convert one field descriptor (`Ljava/lang/String;`, `[I`) to a Java type.
pub fn field_type(descriptor: &str) -> Option<String> {
    let (ty, rest) = read_type(descriptor)?;
    rest.is_empty().then_some(ty)
}

/// Convert a method descriptor `(Ljava/lang/String;I)V` to parameter and
/// return types.
pub fn method_types(descriptor: &str) -> Option<(Vec<String>, String)> {
    let inner = descriptor.strip_prefix('(')?;
    let close = inner.find(')')?;
    let mut params_part = inner.get(..close)?;
    let ret_part = inner.get(close + 1..)?;

    let mut params = Vec::new();
    while !params_part.is_empty() {
        let (ty, rest) = read_type(params_part)?;
        params.push(ty);
        params_part = rest;
    }
    let (returns, rest) = read_type(ret_part)?;
    rest.is_empty().then_some((params, returns))
}

fn read_type(s: &str) -> Option<(String, &str)> {
    let mut chars = s.chars();
    let first = chars.next()?;
    let rest = chars.as_str();
    let primitive = match first {
        'B' => "byte",
        'C' => "char",
        'D' => "double",
        'F' => "float",
        'I' => "int",
        'J' => "long",
        'S' => "short",
        'Z' => "boolean",
        'V' => "void",
        'L' => {
            let end = rest.find(';')?;
            let name = rest.get(..end)?;
            return Some((internal_to_java(name), rest.get(end + 1..)?));
        }
        '[' => {
            let (element, after) = read_type(rest)?;
            return Some((format!("{element}[]"), after));
        }
        _ => return None,
    };
    Some((primitive.to_owned(), rest))
}
