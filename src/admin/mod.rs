//! Admin console: site sections, brokers, articles and credentials.

pub mod security;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::backup;
use crate::blog::{article_id, Article, ArticleStore};
use crate::error::{EtfError, EtfResult};
use crate::logging::{log, log_admin_action, obj, v_str, Domain, Level};
use crate::storage::{keys, LocalStore};

pub const SITE_NAME: &str = "GuadagnareConETF";
pub const DEFAULT_USERNAME: &str = "admin";
pub const PASSWORD_LEN: usize = 12;
const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub visible: bool,
    pub order: u32,
}

pub fn default_sections() -> BTreeMap<String, Section> {
    [
        ("home", "Home/Hero"),
        ("ricerca", "Ricerca ETF"),
        ("comparatore", "Comparatore"),
        ("simulatore", "Simulatore"),
        ("portafoglio", "Portfolio"),
        ("fire", "Calcolatore FIRE"),
        ("brokers", "Brokers"),
        ("blog", "Blog"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (key, name))| {
        (key.to_string(), Section { name: name.to_string(), visible: true, order: i as u32 + 1 })
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Broker {
    pub name: String,
    pub description: String,
    pub commission: String,
    pub rating: f64,
    pub affiliate_link: String,
    pub website: String,
    pub features: Vec<String>,
    pub active: bool,
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            commission: "N/A".to_string(),
            rating: 0.0,
            affiliate_link: String::new(),
            website: String::new(),
            features: Vec::new(),
            active: true,
        }
    }
}

pub fn default_brokers() -> Vec<Broker> {
    vec![
        Broker {
            name: "Degiro".into(),
            description: "Broker europeo con commissioni competitive".into(),
            commission: "€2 per transazione".into(),
            rating: 4.5,
            affiliate_link: "https://degiro.com".into(),
            ..Broker::default()
        },
        Broker {
            name: "Interactive Brokers".into(),
            description: "Broker professionale con accesso globale".into(),
            commission: "0.05% min €1.25".into(),
            rating: 4.8,
            affiliate_link: "https://interactivebrokers.com".into(),
            ..Broker::default()
        },
    ]
}

pub fn default_articles(now: DateTime<Utc>) -> Vec<Article> {
    let make = |title: &str, excerpt: &str, content: &str, published: bool| Article {
        id: article_id(title, now),
        title: title.into(),
        excerpt: excerpt.into(),
        content: content.into(),
        date: now.to_rfc3339(),
        category: "Guide agli Investimenti".into(),
        published,
        ..Article::default()
    };
    vec![
        make(
            "Come iniziare con gli ETF",
            "Guida completa per principianti agli investimenti in ETF",
            "Gli ETF (Exchange Traded Funds) sono strumenti di investimento...",
            true,
        ),
        make(
            "Diversificazione del portafoglio",
            "Strategie per diversificare efficacemente i tuoi investimenti",
            "La diversificazione è fondamentale per ridurre il rischio...",
            false,
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub site_name: String,
    pub admin_username: String,
    pub admin_password: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self { site_name: SITE_NAME.to_string(), admin_username: String::new(), admin_password: String::new() }
    }
}

/// The `adminData` blob. Missing top-level fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminData {
    pub sections: BTreeMap<String, Section>,
    pub brokers: Vec<Broker>,
    pub settings: Settings,
}

impl Default for AdminData {
    fn default() -> Self {
        Self { sections: default_sections(), brokers: Vec::new(), settings: Settings::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl std::str::FromStr for Direction {
    type Err = EtfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(EtfError::validation(format!("Direzione non valida: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerInput {
    pub name: String,
    pub description: String,
    pub commission: String,
    pub rating: Option<f64>,
    pub affiliate_link: String,
    pub website: String,
    pub features: Vec<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleInput {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub featured: Option<bool>,
    pub published: Option<bool>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsInput {
    pub site_name: String,
    pub admin_username: String,
    pub admin_password: String,
}

/// Settings as shown outside the console; the password never leaves it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSettings {
    pub site_name: String,
    pub admin_username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminExport {
    pub sections: BTreeMap<String, Section>,
    pub brokers: Vec<Broker>,
    pub articles: Vec<Article>,
    pub settings: PublicSettings,
}

pub fn generate_password<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PASSWORD_LEN)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

fn non_blank(candidate: &str, current: &str) -> String {
    if candidate.trim().is_empty() {
        current.to_string()
    } else {
        candidate.to_string()
    }
}

/// Console over the key/value store and the blog store for one unit of work.
pub struct AdminConsole<'a> {
    store: &'a mut LocalStore,
    articles: &'a mut ArticleStore,
    data: AdminData,
    auto_backup_secs: i64,
    clock: fn() -> DateTime<Utc>,
    generated_password: Option<String>,
}

impl<'a> AdminConsole<'a> {
    /// Loads `adminData`, seeding defaults, demo content and first-run credentials.
    pub fn load(store: &'a mut LocalStore, articles: &'a mut ArticleStore) -> EtfResult<Self> {
        Self::load_with(store, articles, 1800, Utc::now)
    }

    pub fn load_with(
        store: &'a mut LocalStore,
        articles: &'a mut ArticleStore,
        auto_backup_secs: i64,
        clock: fn() -> DateTime<Utc>,
    ) -> EtfResult<Self> {
        let stored: Option<AdminData> = store.get_json(keys::ADMIN_DATA)?;
        let mut console = Self {
            data: stored.clone().unwrap_or_default(),
            store,
            articles,
            auto_backup_secs,
            clock,
            generated_password: None,
        };
        let mut dirty = stored.is_none();
        if console.data.settings.admin_username.is_empty() || console.data.settings.admin_password.is_empty() {
            let password = generate_password(&mut rand::thread_rng());
            console.data.settings.admin_username = DEFAULT_USERNAME.to_string();
            console.data.settings.admin_password = password.clone();
            console.generated_password = Some(password);
            log(Level::Warn, Domain::Admin, "credentials_generated", obj(&[("username", v_str(DEFAULT_USERNAME))]));
            dirty = true;
        }
        if console.data.brokers.is_empty() {
            console.data.brokers = default_brokers();
            dirty = true;
        }
        if console.articles.is_empty() {
            let now = (console.clock)();
            console.articles.save_many(default_articles(now))?;
        }
        if dirty {
            console.save()?;
        }
        Ok(console)
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// The password created on this load, if credentials were missing.
    pub fn take_generated_password(&mut self) -> Option<String> {
        self.generated_password.take()
    }

    pub fn data(&self) -> &AdminData {
        &self.data
    }

    pub fn articles(&self) -> &ArticleStore {
        &*self.articles
    }

    pub fn store(&mut self) -> &mut LocalStore {
        &mut *self.store
    }

    /// Writes `adminData` and takes an auto backup when the last one is stale.
    pub fn save(&mut self) -> EtfResult<()> {
        self.store.set_json(keys::ADMIN_DATA, &self.data)?;
        let now = self.now();
        if backup::auto_backup_due(&*self.store, now, self.auto_backup_secs)? {
            backup::create_auto_backup(self)?;
        }
        Ok(())
    }

    /// Replaces the console content wholesale; used by restores.
    pub(crate) fn overwrite(
        &mut self,
        sections: BTreeMap<String, Section>,
        brokers: Vec<Broker>,
        articles: Vec<Article>,
    ) -> EtfResult<()> {
        self.data.sections = sections;
        self.data.brokers = brokers;
        self.articles.replace_all(articles)?;
        self.save()
    }

    /// Sections in display order.
    pub fn sections_ordered(&self) -> Vec<(&str, &Section)> {
        let mut out: Vec<(&str, &Section)> = self.data.sections.iter().map(|(k, s)| (k.as_str(), s)).collect();
        out.sort_by_key(|(_, s)| s.order);
        out
    }

    pub fn visible_sections(&self) -> Vec<(&str, &Section)> {
        self.sections_ordered().into_iter().filter(|(_, s)| s.visible).collect()
    }

    fn section_mut(&mut self, key: &str) -> EtfResult<&mut Section> {
        self.data
            .sections
            .get_mut(key)
            .ok_or_else(|| EtfError::NotFound(format!("Sezione non trovata: {}", key)))
    }

    /// Returns the new visibility.
    pub fn toggle_section(&mut self, key: &str) -> EtfResult<bool> {
        let section = self.section_mut(key)?;
        section.visible = !section.visible;
        let visible = section.visible;
        self.save()?;
        log_admin_action("toggle_section", key, true);
        Ok(visible)
    }

    /// Swaps order with the neighbour; returns `false` at either end.
    pub fn move_section(&mut self, key: &str, direction: Direction) -> EtfResult<bool> {
        let current = self.section_mut(key)?.order;
        let max = self.data.sections.values().map(|s| s.order).max().unwrap_or(current);
        let target_order = match direction {
            Direction::Up if current > 1 => current - 1,
            Direction::Down if current < max => current + 1,
            _ => return Ok(false),
        };
        let neighbour = self
            .data
            .sections
            .iter()
            .find(|(_, s)| s.order == target_order)
            .map(|(k, _)| k.clone());
        let Some(neighbour) = neighbour else {
            return Ok(false);
        };
        if let Some(s) = self.data.sections.get_mut(&neighbour) {
            s.order = current;
        }
        self.section_mut(key)?.order = target_order;
        self.save()?;
        log_admin_action("move_section", key, true);
        Ok(true)
    }

    pub fn brokers(&self) -> &[Broker] {
        &self.data.brokers
    }

    pub fn add_broker(&mut self, input: BrokerInput) -> EtfResult<&Broker> {
        let clean =
            security::validate_broker(&input.name, &input.description, &input.website, input.rating, &input.features)?;
        let commission = if input.commission.trim().is_empty() { "N/A".to_string() } else { input.commission };
        self.data.brokers.push(Broker {
            name: clean.name,
            description: clean.description,
            commission,
            rating: clean.rating,
            affiliate_link: input.affiliate_link,
            website: clean.website,
            features: clean.features,
            active: input.active.unwrap_or(true),
        });
        self.save()?;
        log_admin_action("add_broker", &input.name, true);
        let idx = self.data.brokers.len() - 1;
        Ok(&self.data.brokers[idx])
    }

    /// Blank fields keep the current value.
    pub fn edit_broker(&mut self, index: usize, input: BrokerInput) -> EtfResult<&Broker> {
        let current = self
            .data
            .brokers
            .get(index)
            .cloned()
            .ok_or_else(|| EtfError::NotFound(format!("Broker non trovato: {}", index)))?;
        let name = non_blank(&input.name, &current.name);
        let description = non_blank(&input.description, &current.description);
        let website = non_blank(&input.website, &current.website);
        let rating = input.rating.filter(|r| *r != 0.0).or(Some(current.rating));
        let features = if input.features.is_empty() { current.features.clone() } else { input.features };
        let clean = security::validate_broker(&name, &description, &website, rating, &features)?;
        self.data.brokers[index] = Broker {
            name: clean.name,
            description: clean.description,
            commission: non_blank(&input.commission, &current.commission),
            rating: clean.rating,
            affiliate_link: non_blank(&input.affiliate_link, &current.affiliate_link),
            website: clean.website,
            features: clean.features,
            active: input.active.unwrap_or(current.active),
        };
        self.save()?;
        log_admin_action("edit_broker", &name, true);
        Ok(&self.data.brokers[index])
    }

    pub fn delete_broker(&mut self, index: usize) -> EtfResult<Broker> {
        if index >= self.data.brokers.len() {
            return Err(EtfError::NotFound(format!("Broker non trovato: {}", index)));
        }
        let removed = self.data.brokers.remove(index);
        self.save()?;
        log_admin_action("delete_broker", &removed.name, true);
        Ok(removed)
    }

    /// New articles start unpublished unless the input says otherwise.
    pub fn add_article(&mut self, input: ArticleInput) -> EtfResult<Article> {
        let clean = security::validate_article(&input.title, &input.excerpt, &input.content)?;
        let now = self.now();
        let article = Article {
            id: self.articles.unused_id(&article_id(&input.title, now)),
            title: clean.title,
            excerpt: clean.excerpt,
            content: clean.content,
            date: now.to_rfc3339(),
            category: input.category.unwrap_or_default(),
            tags: input.tags.unwrap_or_default(),
            featured: input.featured.unwrap_or(false),
            published: input.published.unwrap_or(false),
            image: input.image.unwrap_or_default(),
            ..Article::default()
        };
        self.articles.save(article.clone())?;
        log_admin_action("add_article", &article.id, true);
        Ok(article)
    }

    pub fn edit_article(&mut self, id: &str, input: ArticleInput) -> EtfResult<Article> {
        let current = self
            .articles
            .by_id(id)
            .cloned()
            .ok_or_else(|| EtfError::NotFound(format!("Articolo non trovato: {}", id)))?;
        let title = non_blank(&input.title, &current.title);
        let excerpt = non_blank(&input.excerpt, &current.excerpt);
        let content = non_blank(&input.content, &current.content);
        let clean = security::validate_article(&title, &excerpt, &content)?;
        let updated = Article {
            title: clean.title,
            excerpt: clean.excerpt,
            content: clean.content,
            category: input.category.unwrap_or(current.category.clone()),
            tags: input.tags.unwrap_or(current.tags.clone()),
            featured: input.featured.unwrap_or(current.featured),
            published: input.published.unwrap_or(current.published),
            image: input.image.unwrap_or(current.image.clone()),
            ..current
        };
        self.articles.save(updated.clone())?;
        log_admin_action("edit_article", id, true);
        Ok(updated)
    }

    /// Returns the new published flag.
    pub fn toggle_article(&mut self, id: &str) -> EtfResult<bool> {
        let mut article = self
            .articles
            .by_id(id)
            .cloned()
            .ok_or_else(|| EtfError::NotFound(format!("Articolo non trovato: {}", id)))?;
        article.published = !article.published;
        let published = article.published;
        self.articles.save(article)?;
        log_admin_action("toggle_article", id, true);
        Ok(published)
    }

    pub fn delete_article(&mut self, id: &str) -> EtfResult<()> {
        if !self.articles.delete(id)? {
            return Err(EtfError::NotFound(format!("Articolo non trovato: {}", id)));
        }
        log_admin_action("delete_article", id, true);
        Ok(())
    }

    pub fn settings(&self) -> PublicSettings {
        PublicSettings {
            site_name: self.data.settings.site_name.clone(),
            admin_username: self.data.settings.admin_username.clone(),
        }
    }

    /// The password is only replaced when a non-blank one is given; returns whether it changed.
    pub fn save_settings(&mut self, input: SettingsInput) -> EtfResult<bool> {
        let site_name = input.site_name.trim();
        let username = input.admin_username.trim();
        if site_name.is_empty() {
            return Err(EtfError::validation("Il nome del sito è obbligatorio"));
        }
        if username.is_empty() {
            return Err(EtfError::validation("Il nome utente è obbligatorio"));
        }
        self.data.settings.site_name = security::sanitize_html(site_name);
        self.data.settings.admin_username = username.to_string();
        let changed = !input.admin_password.trim().is_empty();
        if changed {
            self.data.settings.admin_password = input.admin_password;
        }
        self.save()?;
        log_admin_action("save_settings", if changed { "password" } else { "settings" }, true);
        Ok(changed)
    }

    pub fn verify_credentials(&self, username: &str, password: &str) -> bool {
        let s = &self.data.settings;
        !s.admin_password.is_empty() && s.admin_username == username && s.admin_password == password
    }

    pub fn export(&self) -> AdminExport {
        AdminExport {
            sections: self.data.sections.clone(),
            brokers: self.data.brokers.clone(),
            articles: self.articles.all().to_vec(),
            settings: self.settings(),
        }
    }

    /// Drops `adminData` and reseeds defaults and credentials. Articles are left alone.
    pub fn reset(self) -> EtfResult<AdminConsole<'a>> {
        let Self { store, articles, auto_backup_secs, clock, .. } = self;
        store.remove(keys::ADMIN_DATA)?;
        log(Level::Warn, Domain::Admin, "admin_reset", obj(&[("key", json!(keys::ADMIN_DATA))]));
        Self::load_with(store, articles, auto_backup_secs, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap()
    }

    fn setup() -> (LocalStore, ArticleStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let articles = ArticleStore::open(dir.path().join("blog.json")).unwrap();
        (LocalStore::in_memory().unwrap(), articles, dir)
    }

    #[test]
    fn first_load_seeds_everything() {
        let (mut store, mut articles, _dir) = setup();
        let mut console = AdminConsole::load_with(&mut store, &mut articles, 1800, fixed).unwrap();
        let password = console.take_generated_password().unwrap();
        assert_eq!(password.len(), PASSWORD_LEN);
        assert!(password.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
        assert!(console.verify_credentials("admin", &password));
        assert!(!console.verify_credentials("admin", "wrong"));
        assert_eq!(console.brokers().len(), 2);
        assert_eq!(console.articles().len(), 2);
        assert_eq!(console.sections_ordered()[0].0, "home");
        assert_eq!(console.sections_ordered()[7].0, "blog");
        drop(console);

        let mut again = AdminConsole::load_with(&mut store, &mut articles, 1800, fixed).unwrap();
        assert!(again.take_generated_password().is_none());
    }

    #[test]
    fn move_swaps_with_neighbour() {
        let (mut store, mut articles, _dir) = setup();
        let mut console = AdminConsole::load_with(&mut store, &mut articles, 1800, fixed).unwrap();
        assert!(!console.move_section("home", Direction::Up).unwrap());
        assert!(!console.move_section("blog", Direction::Down).unwrap());
        assert!(console.move_section("fire", Direction::Up).unwrap());
        let order: Vec<&str> = console.sections_ordered().iter().map(|(k, _)| *k).collect();
        assert_eq!(order[4..6], ["fire", "portafoglio"]);
        assert!(matches!(console.move_section("nope", Direction::Up), Err(EtfError::NotFound(_))));
    }

    #[test]
    fn toggle_hides_from_visible() {
        let (mut store, mut articles, _dir) = setup();
        let mut console = AdminConsole::load_with(&mut store, &mut articles, 1800, fixed).unwrap();
        assert!(!console.toggle_section("blog").unwrap());
        assert_eq!(console.visible_sections().len(), 7);
        drop(console);
        let console = AdminConsole::load_with(&mut store, &mut articles, 1800, fixed).unwrap();
        assert!(!console.data().sections["blog"].visible);
    }

    #[test]
    fn broker_crud_validates() {
        let (mut store, mut articles, _dir) = setup();
        let mut console = AdminConsole::load_with(&mut store, &mut articles, 1800, fixed).unwrap();
        let err = console
            .add_broker(BrokerInput { name: String::new(), rating: Some(9.0), ..BrokerInput::default() })
            .unwrap_err();
        assert_eq!(err.messages().len(), 2);

        let added = console
            .add_broker(BrokerInput { name: "Fineco <b>".into(), rating: Some(4.0), ..BrokerInput::default() })
            .unwrap();
        assert_eq!(added.name, "Fineco &lt;b&gt;");
        assert_eq!(added.commission, "N/A");

        let edited = console
            .edit_broker(2, BrokerInput { description: "Banca italiana".into(), ..BrokerInput::default() })
            .unwrap();
        assert_eq!(edited.description, "Banca italiana");
        assert_eq!(edited.rating, 4.0);

        assert_eq!(console.delete_broker(0).unwrap().name, "Degiro");
        assert!(console.delete_broker(10).is_err());
        assert_eq!(console.brokers().len(), 2);
    }

    #[test]
    fn article_lifecycle() {
        let (mut store, mut articles, _dir) = setup();
        let mut console = AdminConsole::load_with(&mut store, &mut articles, 1800, fixed).unwrap();
        let created = console
            .add_article(ArticleInput {
                title: "Nuovo articolo".into(),
                content: "<p>Testo</p><script>x()</script>".into(),
                ..ArticleInput::default()
            })
            .unwrap();
        assert!(!created.published);
        assert_eq!(created.content, "<p>Testo</p>");

        assert!(console.toggle_article(&created.id).unwrap());
        let edited = console
            .edit_article(&created.id, ArticleInput { excerpt: "Riassunto".into(), ..ArticleInput::default() })
            .unwrap();
        assert_eq!(edited.title, "Nuovo articolo");
        assert_eq!(edited.excerpt, "Riassunto");
        assert!(edited.published);

        console.delete_article(&created.id).unwrap();
        assert!(matches!(console.delete_article(&created.id), Err(EtfError::NotFound(_))));
    }

    #[test]
    fn same_title_in_same_second_gets_distinct_ids() {
        let (mut store, mut articles, _dir) = setup();
        let mut console = AdminConsole::load_with(&mut store, &mut articles, 1800, fixed).unwrap();
        let before = console.articles().len();
        let input = |content: &str| ArticleInput {
            title: "Guida ETF: Cos'è? #1/2".into(),
            content: content.into(),
            ..ArticleInput::default()
        };
        let first = console.add_article(input("primo")).unwrap();
        let second = console.add_article(input("secondo")).unwrap();

        assert_eq!(first.id, format!("guida-etf-cosè-12-{}", fixed().timestamp()));
        assert_eq!(second.id, format!("{}-2", first.id));
        assert_eq!(console.articles().len(), before + 2);
        assert_eq!(console.articles().by_id(&first.id).unwrap().content, "primo");
    }

    #[test]
    fn settings_keep_password_when_blank() {
        let (mut store, mut articles, _dir) = setup();
        let mut console = AdminConsole::load_with(&mut store, &mut articles, 1800, fixed).unwrap();
        let original = console.take_generated_password().unwrap();
        let changed = console
            .save_settings(SettingsInput {
                site_name: "ETF Italia".into(),
                admin_username: "root".into(),
                admin_password: "  ".into(),
            })
            .unwrap();
        assert!(!changed);
        assert!(console.verify_credentials("root", &original));
        assert!(console
            .save_settings(SettingsInput {
                site_name: "ETF Italia".into(),
                admin_username: "root".into(),
                admin_password: "nuova-pass".into(),
            })
            .unwrap());
        assert!(console.verify_credentials("root", "nuova-pass"));
        let export = serde_json::to_string(&console.export()).unwrap();
        assert!(!export.contains("nuova-pass"));
    }

    #[test]
    fn reset_regenerates_credentials() {
        let (mut store, mut articles, _dir) = setup();
        let mut console = AdminConsole::load_with(&mut store, &mut articles, 1800, fixed).unwrap();
        console.toggle_section("home").unwrap();
        let mut fresh = console.reset().unwrap();
        assert!(fresh.take_generated_password().is_some());
        assert!(fresh.data().sections["home"].visible);
        assert_eq!(fresh.articles().len(), 2);
    }
}
