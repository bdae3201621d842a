//! 能力描述 (caps).
//!
//! caps 由若干结构组成, 每个结构包含媒体名与字段集合, 用于判断两端是否能协商.
//! 文本语法: `video/x-raw, format=I420, width=[16, 4096]; audio/x-raw`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::TaoError;
use crate::stream_type::StreamType;

/// caps 字段值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapsValue {
    /// 整数
    Int(i64),
    /// 布尔
    Bool(bool),
    /// 字符串
    Str(String),
    /// 闭区间整数范围
    IntRange(i64, i64),
    /// 候选值列表, 任一匹配即可
    List(Vec<CapsValue>),
}

impl CapsValue {
    /// 两个值是否存在交集
    pub fn intersects(&self, other: &CapsValue) -> bool {
        match (self, other) {
            (Self::List(items), other) => items.iter().any(|v| v.intersects(other)),
            (this, Self::List(items)) => items.iter().any(|v| this.intersects(v)),
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(v), Self::IntRange(lo, hi)) | (Self::IntRange(lo, hi), Self::Int(v)) => {
                lo <= v && v <= hi
            }
            (Self::IntRange(a0, a1), Self::IntRange(b0, b1)) => a0 <= b1 && b0 <= a1,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for CapsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
            Self::IntRange(lo, hi) => write!(f, "[{lo}, {hi}]"),
            Self::List(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// 单个 caps 结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsStructure {
    /// 媒体名, 如 `video/x-h264`
    pub name: String,
    /// 字段
    pub fields: BTreeMap<String, CapsValue>,
}

impl CapsStructure {
    /// 创建无字段的结构
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// 追加字段 (构建器风格)
    pub fn with_field(mut self, key: impl Into<String>, value: CapsValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// 获取字段值
    pub fn get(&self, key: &str) -> Option<&CapsValue> {
        self.fields.get(key)
    }

    /// 媒体名相同, 且共有字段全部相交
    pub fn can_intersect(&self, other: &CapsStructure) -> bool {
        if self.name != other.name {
            return false;
        }
        self.fields.iter().all(|(key, value)| match other.fields.get(key) {
            Some(theirs) => value.intersects(theirs),
            None => true,
        })
    }
}

impl fmt::Display for CapsStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, value) in &self.fields {
            write!(f, ", {key}={value}")?;
        }
        Ok(())
    }
}

/// 能力描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caps {
    /// 接受任意数据
    Any,
    /// 结构列表, 为空时表示 EMPTY
    Structures(Vec<CapsStructure>),
}

impl Caps {
    /// 任意 caps
    pub fn any() -> Self {
        Self::Any
    }

    /// 空 caps, 与任何 caps 都不相交
    pub fn empty() -> Self {
        Self::Structures(Vec::new())
    }

    /// 仅含一个无字段结构的 caps
    pub fn new_simple(name: impl Into<String>) -> Self {
        Self::Structures(vec![CapsStructure::new(name)])
    }

    /// 由单个结构构建
    pub fn from_structure(structure: CapsStructure) -> Self {
        Self::Structures(vec![structure])
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Structures(s) if s.is_empty())
    }

    /// 结构列表, ANY 返回空切片
    pub fn structures(&self) -> &[CapsStructure] {
        match self {
            Self::Any => &[],
            Self::Structures(s) => s,
        }
    }

    /// 第一个结构的媒体名
    pub fn media_name(&self) -> Option<&str> {
        self.structures().first().map(|s| s.name.as_str())
    }

    /// 按第一个结构推断流类型
    pub fn stream_type(&self) -> StreamType {
        self.media_name()
            .map(StreamType::from_media_name)
            .unwrap_or(StreamType::UNKNOWN)
    }

    /// 两组 caps 是否存在交集
    pub fn can_intersect(&self, other: &Caps) -> bool {
        match (self, other) {
            (Self::Any, other) | (other, Self::Any) => !other.is_empty(),
            (Self::Structures(a), Self::Structures(b)) => a
                .iter()
                .any(|sa| b.iter().any(|sb| sa.can_intersect(sb))),
        }
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "ANY"),
            Self::Structures(s) if s.is_empty() => write!(f, "EMPTY"),
            Self::Structures(s) => {
                for (i, structure) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{structure}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Caps {
    type Err = TaoError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        match text {
            "ANY" => return Ok(Self::Any),
            "EMPTY" | "" => return Ok(Self::empty()),
            _ => {}
        }
        let mut structures = Vec::new();
        for part in split_top_level(text, ';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            structures.push(parse_structure(part)?);
        }
        Ok(Self::Structures(structures))
    }
}

// ============================================================
// 文本解析
// ============================================================

/// 按分隔符切分, 跳过括号内部
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_structure(text: &str) -> Result<CapsStructure, TaoError> {
    let mut fields = split_top_level(text, ',').into_iter();
    let name = fields.next().unwrap_or_default().trim();
    // 忽略特性标注, 如 video/x-raw(ANY)
    let name = name.split('(').next().unwrap_or(name).trim();
    if name.is_empty() || !name.contains('/') {
        return Err(TaoError::InvalidArgument(format!("无效的 caps 媒体名: {text}")));
    }
    let mut structure = CapsStructure::new(name);
    for field in fields {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| TaoError::InvalidArgument(format!("无效的 caps 字段: {field}")))?;
        structure
            .fields
            .insert(key.trim().to_string(), parse_value(value.trim())?);
    }
    Ok(structure)
}

fn parse_value(text: &str) -> Result<CapsValue, TaoError> {
    // 去掉类型前缀, 如 (int)5
    let text = match text.strip_prefix('(') {
        Some(rest) => rest.split_once(')').map(|(_, v)| v.trim()).unwrap_or(text),
        None => text,
    };
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let (lo, hi) = inner
            .split_once(',')
            .ok_or_else(|| TaoError::InvalidArgument(format!("无效的范围: {text}")))?;
        let lo = lo.trim().parse::<i64>();
        let hi = hi.trim().parse::<i64>();
        return match (lo, hi) {
            (Ok(lo), Ok(hi)) if lo <= hi => Ok(CapsValue::IntRange(lo, hi)),
            _ => Err(TaoError::InvalidArgument(format!("无效的范围: {text}"))),
        };
    }
    if let Some(inner) = text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        let items = split_top_level(inner, ',')
            .into_iter()
            .map(|item| parse_value(item.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(CapsValue::List(items));
    }
    if let Ok(v) = text.parse::<i64>() {
        return Ok(CapsValue::Int(v));
    }
    match text {
        "true" => Ok(CapsValue::Bool(true)),
        "false" => Ok(CapsValue::Bool(false)),
        _ => Ok(CapsValue::Str(text.trim_matches('"').to_string())),
    }
}
