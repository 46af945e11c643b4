//! Built-in application catalog
//!
//! The catalog is a fixed, read-only set of [`AppDefinition`]s loaded at
//! startup. Installations reference entries by id; nothing mutates the
//! catalog after construction.

use crate::error::{Error, Result};
use crate::types::AppDefinition;
use std::collections::HashMap;

/// Read-only lookup table over the installable app definitions.
#[derive(Debug, Clone)]
pub struct AppRegistry {
    apps: Vec<AppDefinition>,
}

impl AppRegistry {
    /// Build a registry from an explicit definition list (used by tests).
    pub fn new(apps: Vec<AppDefinition>) -> Self {
        Self { apps }
    }

    /// The built-in catalog shipped with the panel.
    pub fn builtin() -> Self {
        Self::new(builtin_catalog())
    }

    pub fn get(&self, id: &str) -> Result<&AppDefinition> {
        self.apps
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found("app", id))
    }

    pub fn list(&self) -> &[AppDefinition] {
        &self.apps
    }

    pub fn list_by_category(&self, category: &str) -> Vec<&AppDefinition> {
        self.apps
            .iter()
            .filter(|a| a.category == category)
            .collect()
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for app in &self.apps {
            if !seen.contains(&app.category) {
                seen.push(app.category.clone());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn app(
    id: &str,
    name: &str,
    description: &str,
    version: &str,
    author: &str,
    category: &str,
    image: &str,
    port: u16,
) -> AppDefinition {
    AppDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        version: version.to_string(),
        author: author.to_string(),
        category: category.to_string(),
        image: image.to_string(),
        port,
        env: HashMap::new(),
        volumes: Vec::new(),
        requires_runtime: true,
    }
}

fn with_volumes(mut def: AppDefinition, volumes: &[&str]) -> AppDefinition {
    def.volumes = volumes.iter().map(|v| v.to_string()).collect();
    def
}

fn with_env(mut def: AppDefinition, pairs: &[(&str, &str)]) -> AppDefinition {
    def.env = env(pairs);
    def
}

fn builtin_catalog() -> Vec<AppDefinition> {
    vec![
        with_volumes(
            app(
                "nginx",
                "Nginx",
                "High performance HTTP and reverse proxy server",
                "1.25.3",
                "Nginx Inc.",
                "Web Servers",
                "nginx:latest",
                80,
            ),
            &[
                "/data/nginx/html:/usr/share/nginx/html",
                "/data/nginx/conf:/etc/nginx/conf.d",
            ],
        ),
        with_env(
            with_volumes(
                app(
                    "mysql",
                    "MySQL",
                    "The most popular open source relational database",
                    "8.0.35",
                    "Oracle",
                    "Databases",
                    "mysql:8.0",
                    3306,
                ),
                &["/data/mysql:/var/lib/mysql"],
            ),
            &[("MYSQL_ROOT_PASSWORD", "root123")],
        ),
        with_volumes(
            app(
                "redis",
                "Redis",
                "High performance key-value store",
                "7.2.3",
                "Redis Ltd.",
                "Databases",
                "redis:7-alpine",
                6379,
            ),
            &["/data/redis:/data"],
        ),
        with_volumes(
            app(
                "mongodb",
                "MongoDB",
                "Popular NoSQL document database",
                "7.0.4",
                "MongoDB Inc.",
                "Databases",
                "mongo:7",
                27017,
            ),
            &["/data/mongodb:/data/db"],
        ),
        with_env(
            with_volumes(
                app(
                    "postgres",
                    "PostgreSQL",
                    "Powerful open source object-relational database",
                    "16.1",
                    "PostgreSQL Global",
                    "Databases",
                    "postgres:16",
                    5432,
                ),
                &["/data/postgres:/var/lib/postgresql/data"],
            ),
            &[("POSTGRES_PASSWORD", "postgres123")],
        ),
        app(
            "nodejs",
            "Node.js",
            "JavaScript runtime built on Chrome's V8 engine",
            "20.10.0",
            "Node.js Foundation",
            "Runtimes",
            "node:20-alpine",
            3000,
        ),
        app(
            "python",
            "Python",
            "Popular general-purpose programming language",
            "3.12.1",
            "Python Software Foundation",
            "Runtimes",
            "python:3.12-slim",
            8000,
        ),
        with_env(
            with_volumes(
                app(
                    "wordpress",
                    "WordPress",
                    "Popular content management system",
                    "6.4.2",
                    "WordPress Foundation",
                    "CMS",
                    "wordpress:latest",
                    8080,
                ),
                &["/data/wordpress:/var/www/html"],
            ),
            &[
                ("WORDPRESS_DB_HOST", "mysql"),
                ("WORDPRESS_DB_USER", "wordpress"),
                ("WORDPRESS_DB_PASSWORD", "wordpress123"),
            ],
        ),
        with_env(
            app(
                "phpmyadmin",
                "phpMyAdmin",
                "Web administration tool for MySQL",
                "5.2.1",
                "phpMyAdmin Project",
                "Tools",
                "phpmyadmin:latest",
                8081,
            ),
            &[("PMA_HOST", "mysql")],
        ),
        with_volumes(
            app(
                "portainer",
                "Portainer",
                "Lightweight Docker management UI",
                "2.19.4",
                "Portainer.io",
                "Tools",
                "portainer/portainer-ce:latest",
                9000,
            ),
            &[
                "/data/portainer:/data",
                "/var/run/docker.sock:/var/run/docker.sock",
            ],
        ),
        with_volumes(
            app(
                "grafana",
                "Grafana",
                "Open source data visualization and monitoring platform",
                "10.2.3",
                "Grafana Labs",
                "Monitoring",
                "grafana/grafana:latest",
                3001,
            ),
            &["/data/grafana:/var/lib/grafana"],
        ),
        with_volumes(
            app(
                "prometheus",
                "Prometheus",
                "Open source monitoring system",
                "2.48.1",
                "Prometheus Project",
                "Monitoring",
                "prom/prometheus:latest",
                9090,
            ),
            &["/data/prometheus:/prometheus"],
        ),
        with_volumes(
            app(
                "elasticsearch",
                "Elasticsearch",
                "Distributed search and analytics engine",
                "8.11.3",
                "Elastic",
                "Search",
                "elasticsearch:8.11.3",
                9200,
            ),
            &["/data/elasticsearch:/usr/share/elasticsearch/data"],
        ),
        with_env(
            app(
                "kibana",
                "Kibana",
                "Data visualization UI for Elasticsearch",
                "8.11.3",
                "Elastic",
                "Search",
                "kibana:8.11.3",
                5601,
            ),
            &[("ELASTICSEARCH_HOSTS", "http://elasticsearch:9200")],
        ),
        with_volumes(
            app(
                "gitlab",
                "GitLab",
                "Complete DevOps platform",
                "16.6.2",
                "GitLab Inc.",
                "Development",
                "gitlab/gitlab-ce:latest",
                8888,
            ),
            &[
                "/data/gitlab/config:/etc/gitlab",
                "/data/gitlab/logs:/var/log/gitlab",
                "/data/gitlab/data:/var/opt/gitlab",
            ],
        ),
        with_volumes(
            app(
                "jenkins",
                "Jenkins",
                "Popular CI/CD automation server",
                "2.426.3",
                "Jenkins Project",
                "Development",
                "jenkins/jenkins:lts",
                8082,
            ),
            &["/data/jenkins:/var/jenkins_home"],
        ),
        with_volumes(
            app(
                "nextcloud",
                "Nextcloud",
                "File sync and collaboration platform",
                "28.0.1",
                "Nextcloud GmbH",
                "Storage",
                "nextcloud:latest",
                8083,
            ),
            &["/data/nextcloud:/var/www/html"],
        ),
        with_volumes(
            app(
                "transmission",
                "Transmission",
                "Lightweight BitTorrent client",
                "4.0.5",
                "Transmission Project",
                "Downloads",
                "linuxserver/transmission:latest",
                9091,
            ),
            &["/data/transmission:/config", "/downloads:/downloads"],
        ),
        with_volumes(
            app(
                "qbittorrent",
                "qBittorrent",
                "Feature-rich BitTorrent client",
                "4.6.1",
                "qBittorrent Project",
                "Downloads",
                "linuxserver/qbittorrent:latest",
                8084,
            ),
            &["/data/qbittorrent:/config", "/downloads:/downloads"],
        ),
        with_volumes(
            app(
                "homeassistant",
                "Home Assistant",
                "Open source home automation platform",
                "2023.12.3",
                "Home Assistant",
                "Smart Home",
                "homeassistant/home-assistant:latest",
                8123,
            ),
            &["/data/homeassistant:/config"],
        ),
    ]
}
