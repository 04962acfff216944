use chrono::{DateTime, NaiveDateTime, Utc};
use rss::{ChannelBuilder, GuidBuilder, Item, ItemBuilder};

use crate::config::AppConfig;
use crate::models::post::Post;
use crate::store::Store;

const FEED_ITEMS: i64 = 25;

fn rfc2822(ndt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc).to_rfc2822()
}

fn item(config: &AppConfig, post: &Post) -> Item {
    let url = config.absolute_url(&format!("/posts/{}", post.slug));
    ItemBuilder::default()
        .title(post.title.clone())
        .link(url.clone())
        .guid(GuidBuilder::default().value(url).permalink(true).build())
        .pub_date(post.published_at.map(rfc2822))
        .description(post.excerpt.clone())
        .build()
}

/// RSS 2.0 document for the given posts, newest first.
pub fn build_feed(config: &AppConfig, posts: &[Post]) -> String {
    let items: Vec<Item> = posts
        .iter()
        .filter(|p| p.is_published())
        .map(|p| item(config, p))
        .collect();

    ChannelBuilder::default()
        .title(config.site.name.clone())
        .link(config.absolute_url("/"))
        .description(config.site.tagline.clone())
        .language(Some("en".to_string()))
        .last_build_date(posts.first().and_then(|p| p.published_at).map(rfc2822))
        .items(items)
        .build()
        .to_string()
}

/// Generate RSS 2.0 XML feed for published posts.
pub fn generate_feed(store: &dyn Store, config: &AppConfig) -> String {
    let posts = store.post_published(FEED_ITEMS, 0);
    build_feed(config, &posts)
}
