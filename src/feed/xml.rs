use feed_rs::model::{Entry, Feed, Link, Person};
use thiserror::Error;

use super::model::FeedType;
use super::normalize::{RawEnclosure, RawFeed, RawImage, RawItem};

#[derive(Debug, Error)]
pub enum XmlError {
    /// The document is not well-formed RSS or Atom.
    #[error("Unable to parse XML feed: {0}")]
    Parse(String),
    /// The body parsed, but as a JSON Feed rather than XML.
    #[error("Unable to parse XML feed: document is JSON, not RSS or Atom")]
    NotXml,
}

/// An RSS/Atom document decoded into the raw shape the normalizer consumes.
#[derive(Debug)]
pub struct DecodedXml {
    pub feed_type: FeedType,
    pub raw: RawFeed,
}

/// Decodes an RSS 0.9x/1.0/2.0 or Atom document.
///
/// The feed is typed `atom` when its self link mentions "atom" or when the
/// document is Atom syntax; everything else is `rss`.
pub fn decode(bytes: &[u8]) -> Result<DecodedXml, XmlError> {
    // feed-rs invents ids (hashes, random UUIDs) for entries without one;
    // an empty id lets the normalizer fall back to the link instead
    let feed = feed_rs::parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)
        .map_err(|e| XmlError::Parse(e.to_string()))?;

    if matches!(feed.feed_type, feed_rs::model::FeedType::JSON) {
        return Err(XmlError::NotXml);
    }

    let is_atom_syntax = matches!(feed.feed_type, feed_rs::model::FeedType::Atom);
    let raw = raw_feed(feed);
    let self_mentions_atom = raw
        .feed_url
        .as_deref()
        .is_some_and(|href| href.to_ascii_lowercase().contains("atom"));

    let feed_type = if self_mentions_atom || is_atom_syntax {
        FeedType::Atom
    } else {
        FeedType::Rss
    };

    Ok(DecodedXml { feed_type, raw })
}

fn raw_feed(feed: Feed) -> RawFeed {
    let feed_url = feed
        .links
        .iter()
        .find(|link| link.rel.as_deref() == Some("self"))
        .map(|link| link.href.clone());

    let image = feed.logo.or(feed.icon).map(|image| RawImage {
        url: Some(image.uri),
        title: image.title,
        link: image.link.map(|link| link.href),
        width: image.width,
        height: image.height,
    });

    RawFeed {
        title: feed.title.map(|t| t.content),
        description: feed.description.map(|d| d.content),
        link: primary_link(&feed.links),
        feed_url,
        language: feed.language,
        copyright: feed.rights.map(|r| r.content),
        managing_editor: feed.authors.first().map(person_label),
        web_master: feed.contributors.first().map(person_label),
        pub_date: feed.published.map(|dt| dt.to_rfc3339()),
        last_build_date: feed.updated.map(|dt| dt.to_rfc3339()),
        image,
        items: feed.entries.into_iter().map(raw_item).collect(),
    }
}

fn raw_item(entry: Entry) -> RawItem {
    let thumbnail = entry
        .media
        .iter()
        .flat_map(|media| media.thumbnails.iter())
        .map(|thumb| thumb.image.uri.clone())
        .next();

    // RSS <enclosure> arrives as media content; Atom uses rel="enclosure" links
    let enclosure = entry
        .media
        .iter()
        .flat_map(|media| media.content.iter())
        .find_map(|content| {
            content.url.as_ref().map(|url| RawEnclosure {
                url: Some(url.to_string()),
                mime_type: content.content_type.as_ref().map(|m| m.to_string()),
                length: content.size,
            })
        })
        .or_else(|| {
            entry
                .links
                .iter()
                .find(|link| link.rel.as_deref() == Some("enclosure"))
                .map(|link| RawEnclosure {
                    url: Some(link.href.clone()),
                    mime_type: link.media_type.clone(),
                    length: link.length,
                })
        });

    RawItem {
        title: entry.title.map(|t| t.content),
        link: primary_link(&entry.links),
        description: entry.summary.map(|s| s.content),
        content: entry.content.and_then(|c| c.body),
        pub_date: entry.published.or(entry.updated).map(|dt| dt.to_rfc3339()),
        guid: Some(entry.id).filter(|id| !id.trim().is_empty()),
        author: entry.authors.first().map(person_label),
        categories: entry.categories.into_iter().map(|c| c.term).collect(),
        thumbnail,
        enclosure,
        ..Default::default()
    }
}

/// First link that is neither the self link nor an enclosure.
fn primary_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|link| !matches!(link.rel.as_deref(), Some("self" | "enclosure")))
        .map(|link| link.href.clone())
}

fn person_label(person: &Person) -> String {
    match person.email.as_deref() {
        Some(email) if person.name.trim().is_empty() => email.to_owned(),
        _ => person.name.clone(),
    }
}
