use std::path::Path;

use kiln_core::ConfigurationError;

pub(crate) fn read(path: &Path) -> Result<String, ConfigurationError> {
    std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn parse<'i>(
    path: &Path,
    contents: &'i str,
) -> Result<roxmltree::Document<'i>, ConfigurationError> {
    roxmltree::Document::parse(contents).map_err(|err| ConfigurationError::MalformedDescriptor {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

pub(crate) fn child_element<'a, 'i>(
    node: roxmltree::Node<'a, 'i>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

pub(crate) fn child_elements<'a, 'i: 'a>(
    node: roxmltree::Node<'a, 'i>,
    name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'i>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// The `<component name="...">` element, searched at any depth.
pub(crate) fn component<'a, 'i>(
    doc: &'a roxmltree::Document<'i>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'i>> {
    doc.descendants()
        .find(|n| n.has_tag_name("component") && n.attribute("name") == Some(name))
}
