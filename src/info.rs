//! Parsing of per-item metadata sidecar files (`:info`, `info`, `info.xml`)
//!
//! The parser only records what the file states. Defaults for owner, group
//! and permissions belong to the caller and are applied at bind time by
//! [`InfoMetadata::bind`].
//!
//! `info.xml` may nest `<Info>` elements inside `<Group>`, `<Client>` and
//! `<Path>` conditions, so its metadata is only known once a client is. The
//! parsed document is kept as an [`InfoSource`] and evaluated per resolution
//! with [`InfoSource::for_client`].

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use xot::{NameId, Node, Xot};

use crate::client::ClientDescriptor;
use crate::specificity::SidecarKind;

/// Encoding reported when the sidecar does not name one
pub const DEFAULT_ENCODING: &str = "ascii";

/// Metadata overrides parsed from one sidecar file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoMetadata {
    pub owner: Option<String>,
    pub group: Option<String>,
    /// Octal permission string, normalized to 4 digits, or `inherit`
    pub perms: Option<String>,
    pub encoding: String,
    pub paranoid: bool,
    pub sensitive: bool,
    pub important: Option<bool>,
    pub mtime: Option<String>,
}

impl Default for InfoMetadata {
    fn default() -> Self {
        Self {
            owner: None,
            group: None,
            perms: None,
            encoding: DEFAULT_ENCODING.to_string(),
            paranoid: false,
            sensitive: false,
            important: None,
            mtime: None,
        }
    }
}

/// Owner, group and permissions after caller defaults were applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundAttributes {
    pub owner: String,
    pub group: String,
    pub perms: String,
    pub encoding: String,
    pub paranoid: bool,
    pub sensitive: bool,
    pub important: Option<bool>,
    pub mtime: Option<String>,
}

impl InfoMetadata {
    /// Parse line-oriented `key: value` content.
    ///
    /// Recognized keys are `owner`, `group`, `perms`, `encoding`,
    /// `paranoid` (bare flag or `paranoid: true|false`), `sensitive`,
    /// `important` and `mtime`. Other lines are ignored.
    pub fn parse_lines(content: &str) -> Self {
        let mut info = Self::default();
        for line in content.lines() {
            let Some(caps) = line_regex().captures(line) else {
                continue;
            };
            let key = &caps["key"];
            let value = caps.name("value").map(|m| m.as_str());
            info.apply(key, value);
        }
        info
    }

    fn apply(&mut self, key: &str, value: Option<&str>) {
        match (key, value) {
            ("owner", Some(v)) => self.owner = Some(v.to_string()),
            ("group", Some(v)) => self.group = Some(v.to_string()),
            ("perms", Some(v)) => self.perms = Some(normalize_perms(v)),
            ("encoding", Some(v)) => self.encoding = v.to_string(),
            ("paranoid", None) => self.paranoid = true,
            ("paranoid", Some(v)) => self.paranoid = parse_flag(v),
            ("sensitive", Some(v)) => self.sensitive = parse_flag(v),
            ("important", Some(v)) => self.important = Some(parse_flag(v)),
            ("mtime", Some(v)) => self.mtime = Some(v.to_string()),
            _ => {}
        }
    }

    /// Fill everything the sidecar left open from the caller's defaults.
    pub fn bind(&self, owner: &str, group: &str, perms: &str) -> BoundAttributes {
        BoundAttributes {
            owner: self.owner.clone().unwrap_or_else(|| owner.to_string()),
            group: self.group.clone().unwrap_or_else(|| group.to_string()),
            perms: self.perms.clone().unwrap_or_else(|| perms.to_string()),
            encoding: self.encoding.clone(),
            paranoid: self.paranoid,
            sensitive: self.sensitive,
            important: self.important,
            mtime: self.mtime.clone(),
        }
    }

    /// Whether permissions should be taken from the base file on disk
    pub fn inherits_perms(&self) -> bool {
        self.perms
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case("inherit"))
    }
}

/// Attributes an `<Info>` element may carry
const INFO_ATTRIBUTES: [&str; 8] = [
    "owner",
    "group",
    "perms",
    "encoding",
    "paranoid",
    "sensitive",
    "important",
    "mtime",
];

/// Parsed content of an item's metadata sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoSource {
    /// `:info` or `info`: the same metadata for every client
    Lines(InfoMetadata),
    /// `info.xml`: `<Info>` elements, possibly behind conditions
    Xml(InfoXml),
}

impl InfoSource {
    /// Parse sidecar content of the given format.
    ///
    /// Malformed XML is logged and yields a document without `<Info>`
    /// elements, so the item falls back to the caller's defaults.
    pub fn parse(kind: SidecarKind, content: &str) -> Self {
        match kind {
            SidecarKind::Lines => Self::Lines(InfoMetadata::parse_lines(content)),
            SidecarKind::Xml => Self::Xml(InfoXml::parse(content).unwrap_or_else(|message| {
                log::warn!("Ignoring malformed info.xml: {}", message);
                InfoXml::default()
            })),
        }
    }

    /// Metadata that applies to `item` when resolved for `client`
    pub fn for_client(&self, item: &str, client: &ClientDescriptor) -> InfoMetadata {
        match self {
            Self::Lines(info) => info.clone(),
            Self::Xml(xml) => xml.select(|condition| condition.matches(item, client)),
        }
    }

    /// Metadata outside of any condition
    pub fn unconditional(&self) -> InfoMetadata {
        match self {
            Self::Lines(info) => info.clone(),
            Self::Xml(xml) => xml.select(|_| false),
        }
    }

    /// Whether the metadata can differ between clients
    pub fn is_conditional(&self) -> bool {
        match self {
            Self::Lines(_) => false,
            Self::Xml(xml) => xml
                .nodes
                .iter()
                .any(|node| matches!(node, InfoNode::When { .. })),
        }
    }
}

/// Tree of `<Info>` elements and the conditions around them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoXml {
    nodes: Vec<InfoNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InfoNode {
    Info(InfoMetadata),
    When {
        condition: Condition,
        negate: bool,
        children: Vec<InfoNode>,
    },
}

/// Test of a `<Group>`, `<Client>` or `<Path>` element
#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Group(String),
    Client(String),
    Path(String),
}

impl Condition {
    fn matches(&self, item: &str, client: &ClientDescriptor) -> bool {
        match self {
            Self::Group(name) => client.in_group(name),
            Self::Client(name) => client.hostname == *name,
            Self::Path(name) => item == name,
        }
    }
}

/// Element and attribute names interned in one document
struct Names {
    info: NameId,
    group: NameId,
    client: NameId,
    path: NameId,
    name: NameId,
    negate: NameId,
    attributes: Vec<(&'static str, NameId)>,
}

impl Names {
    fn intern(xot: &mut Xot) -> Self {
        Self {
            info: xot.add_name("Info"),
            group: xot.add_name("Group"),
            client: xot.add_name("Client"),
            path: xot.add_name("Path"),
            name: xot.add_name("name"),
            negate: xot.add_name("negate"),
            attributes: INFO_ATTRIBUTES
                .iter()
                .map(|key| (*key, xot.add_name(key)))
                .collect(),
        }
    }
}

impl InfoXml {
    /// Parse an `info.xml` document.
    ///
    /// The root is usually `<FileInfo>`; a bare `<Info>` root is accepted as
    /// well. Unknown elements are skipped together with their content.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut xot = Xot::new();
        let names = Names::intern(&mut xot);
        let document = xot.parse(content).map_err(|e| format!("{:?}", e))?;
        let root = xot
            .children(document)
            .find(|node| xot.is_element(*node))
            .ok_or_else(|| "document has no root element".to_string())?;

        let nodes = if element_is(&xot, root, names.info) {
            vec![InfoNode::Info(info_from_element(&xot, root, &names))]
        } else {
            build_nodes(&xot, root, &names)
        };
        Ok(Self { nodes })
    }

    /// Walk the tree the way conditions nest: the `<Info>` children of a
    /// level first, then every matching condition in document order. The
    /// last `<Info>` reached replaces everything before it.
    fn select(&self, matches: impl Fn(&Condition) -> bool) -> InfoMetadata {
        let mut chosen = None;
        select_from(&self.nodes, &matches, &mut chosen);
        chosen.cloned().unwrap_or_default()
    }
}

fn select_from<'a>(
    nodes: &'a [InfoNode],
    matches: &impl Fn(&Condition) -> bool,
    chosen: &mut Option<&'a InfoMetadata>,
) {
    for node in nodes {
        if let InfoNode::Info(info) = node {
            *chosen = Some(info);
        }
    }
    for node in nodes {
        if let InfoNode::When {
            condition,
            negate,
            children,
        } = node
        {
            if matches(condition) != *negate {
                select_from(children, matches, chosen);
            }
        }
    }
}

fn element_is(xot: &Xot, node: Node, name: NameId) -> bool {
    xot.element(node).is_some_and(|element| element.name() == name)
}

fn build_nodes(xot: &Xot, parent: Node, names: &Names) -> Vec<InfoNode> {
    let mut nodes = Vec::new();
    for child in xot.children(parent) {
        let Some(element) = xot.element(child) else {
            continue;
        };
        let tag = element.name();
        if tag == names.info {
            nodes.push(InfoNode::Info(info_from_element(xot, child, names)));
            continue;
        }

        let condition_name = xot.get_attribute(child, names.name).unwrap_or_default();
        let condition = if tag == names.group {
            Condition::Group(condition_name.to_string())
        } else if tag == names.client {
            Condition::Client(condition_name.to_string())
        } else if tag == names.path {
            Condition::Path(condition_name.to_string())
        } else {
            log::debug!("Skipping unknown element in info.xml");
            continue;
        };
        nodes.push(InfoNode::When {
            condition,
            negate: xot
                .get_attribute(child, names.negate)
                .is_some_and(parse_flag),
            children: build_nodes(xot, child, names),
        });
    }
    nodes
}

fn info_from_element(xot: &Xot, node: Node, names: &Names) -> InfoMetadata {
    let mut info = InfoMetadata::default();
    for (key, name) in &names.attributes {
        if let Some(value) = xot.get_attribute(node, *name) {
            info.apply(key, Some(value));
        }
    }
    info
}

/// Left-pad 3-character permission strings with a leading `0`.
pub fn normalize_perms(perms: &str) -> String {
    if perms.len() == 3 {
        format!("0{}", perms)
    } else {
        perms.to_string()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}

fn line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(
            r"^(?P<key>owner|group|perms|encoding|paranoid|sensitive|important|mtime)(?::\s*(?P<value>\S+))?\s*$",
        )
        .expect("info line grammar is a valid regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_keys() {
        let info = InfoMetadata::parse_lines(
            "owner: www\ngroup: www-data\nperms: 640\nencoding: base64\nparanoid\n",
        );
        assert_eq!(info.owner.as_deref(), Some("www"));
        assert_eq!(info.group.as_deref(), Some("www-data"));
        assert_eq!(info.perms.as_deref(), Some("0640"));
        assert_eq!(info.encoding, "base64");
        assert!(info.paranoid);
    }

    #[test]
    fn test_missing_keys_stay_unset() {
        let info = InfoMetadata::parse_lines("owner: nobody\n");
        assert_eq!(info.owner.as_deref(), Some("nobody"));
        assert_eq!(info.group, None);
        assert_eq!(info.perms, None);
        assert_eq!(info.encoding, DEFAULT_ENCODING);
        assert!(!info.paranoid);
    }

    #[test]
    fn test_unrecognized_lines_ignored() {
        let info = InfoMetadata::parse_lines("# comment\nfrobnicate: yes\n  owner: indented\nperms: 0600\n");
        assert_eq!(info.owner, None);
        assert_eq!(info.perms.as_deref(), Some("0600"));
    }

    #[test]
    fn test_four_digit_perms_untouched() {
        assert_eq!(normalize_perms("0755"), "0755");
        assert_eq!(normalize_perms("755"), "0755");
        assert_eq!(normalize_perms("inherit"), "inherit");
    }

    #[test]
    fn test_paranoid_key_value_form() {
        assert!(InfoMetadata::parse_lines("paranoid: true\n").paranoid);
        assert!(!InfoMetadata::parse_lines("paranoid: false\n").paranoid);
    }

    #[test]
    fn test_supplementary_keys() {
        let info = InfoMetadata::parse_lines("sensitive: true\nimportant: false\nmtime: 1300000000\n");
        assert!(info.sensitive);
        assert_eq!(info.important, Some(false));
        assert_eq!(info.mtime.as_deref(), Some("1300000000"));
    }

    #[test]
    fn test_bind_applies_caller_defaults() {
        let info = InfoMetadata::parse_lines("group: wheel\n");
        let bound = info.bind("root", "root", "0644");
        assert_eq!(bound.owner, "root");
        assert_eq!(bound.group, "wheel");
        assert_eq!(bound.perms, "0644");
        assert_eq!(bound.encoding, "ascii");
    }

    #[test]
    fn test_inherit_perms() {
        let info = InfoMetadata::parse_lines("perms: inherit\n");
        assert!(info.inherits_perms());
        assert!(!InfoMetadata::default().inherits_perms());
    }

    fn client(hostname: &str, groups: &[&str]) -> ClientDescriptor {
        groups
            .iter()
            .fold(ClientDescriptor::new(hostname), |c, g| c.with_group(g, 10))
    }

    fn xml(content: &str) -> InfoSource {
        InfoSource::parse(SidecarKind::Xml, content)
    }

    #[test]
    fn test_parse_xml() {
        let source = xml(
            r#"<FileInfo>
  <Info owner="named" group="named" perms="640" encoding="utf-8" paranoid="true"/>
</FileInfo>"#,
        );
        let info = source.for_client("/etc/named.conf", &client("ns1", &[]));
        assert_eq!(info.owner.as_deref(), Some("named"));
        assert_eq!(info.perms.as_deref(), Some("0640"));
        assert_eq!(info.encoding, "utf-8");
        assert!(info.paranoid);
        assert!(!source.is_conditional());
    }

    #[test]
    fn test_parse_xml_without_info_element() {
        let info = xml("<FileInfo/>").for_client("/etc/motd", &client("h1", &[]));
        assert_eq!(info, InfoMetadata::default());
    }

    #[test]
    fn test_bare_info_root() {
        let info = xml(r#"<Info owner="daemon"/>"#).unconditional();
        assert_eq!(info.owner.as_deref(), Some("daemon"));
    }

    #[test]
    fn test_malformed_xml_falls_back_to_defaults() {
        let source = xml("<FileInfo><Info owner='x'></FileInfo>");
        assert_eq!(source.for_client("/etc/motd", &client("h1", &[])), InfoMetadata::default());
    }

    #[test]
    fn test_group_condition() {
        let source = xml(
            r#"<FileInfo>
  <Group name="web"><Info owner="www" perms="0600"/></Group>
  <Info owner="root" perms="0644"/>
</FileInfo>"#,
        );
        assert!(source.is_conditional());

        let web = source.for_client("/etc/motd", &client("web1", &["web"]));
        assert_eq!(web.owner.as_deref(), Some("www"));
        assert_eq!(web.perms.as_deref(), Some("0600"));

        let db = source.for_client("/etc/motd", &client("db1", &[]));
        assert_eq!(db.owner.as_deref(), Some("root"));
        assert_eq!(db.perms.as_deref(), Some("0644"));

        assert_eq!(source.unconditional().owner.as_deref(), Some("root"));
    }

    #[test]
    fn test_client_condition() {
        let source = xml(
            r#"<FileInfo>
  <Client name="db1"><Info owner="postgres" group="postgres"/></Client>
  <Info owner="root"/>
</FileInfo>"#,
        );
        let db1 = source.for_client("/etc/motd", &client("db1", &[]));
        assert_eq!(db1.owner.as_deref(), Some("postgres"));
        assert_eq!(db1.group.as_deref(), Some("postgres"));

        let db2 = source.for_client("/etc/motd", &client("db2", &[]));
        assert_eq!(db2.owner.as_deref(), Some("root"));
        assert_eq!(db2.group, None);
    }

    #[test]
    fn test_negated_condition() {
        let source = xml(
            r#"<FileInfo>
  <Group name="trusted" negate="true"><Info perms="0400"/></Group>
  <Info perms="0644"/>
</FileInfo>"#,
        );
        let outsider = source.for_client("/etc/motd", &client("h1", &[]));
        assert_eq!(outsider.perms.as_deref(), Some("0400"));
        let insider = source.for_client("/etc/motd", &client("h2", &["trusted"]));
        assert_eq!(insider.perms.as_deref(), Some("0644"));
    }

    #[test]
    fn test_nested_conditions_and_path() {
        let source = xml(
            r#"<FileInfo>
  <Group name="web">
    <Info owner="www"/>
    <Path name="/etc/motd"><Info owner="motd"/></Path>
    <Client name="web9"><Info owner="nine"/></Client>
  </Group>
</FileInfo>"#,
        );
        let web1 = client("web1", &["web"]);
        assert_eq!(source.for_client("/etc/motd", &web1).owner.as_deref(), Some("motd"));
        assert_eq!(source.for_client("/etc/issue", &web1).owner.as_deref(), Some("www"));
        // Conditions later in the document win
        let web9 = client("web9", &["web"]);
        assert_eq!(source.for_client("/etc/motd", &web9).owner.as_deref(), Some("nine"));
        assert_eq!(source.for_client("/etc/motd", &client("db1", &[])), InfoMetadata::default());
    }

    #[test]
    fn test_xml_entities_are_decoded() {
        let info = xml(r#"<FileInfo><Info owner="a&amp;b" group="&#119;heel"/></FileInfo>"#)
            .unconditional();
        assert_eq!(info.owner.as_deref(), Some("a&b"));
        assert_eq!(info.group.as_deref(), Some("wheel"));
    }

    #[test]
    fn test_lines_source_ignores_client() {
        let source = InfoSource::parse(SidecarKind::Lines, "owner: www
");
        assert_eq!(source.for_client("/etc/motd", &client("h1", &[])).owner.as_deref(), Some("www"));
        assert!(!source.is_conditional());
    }
}
