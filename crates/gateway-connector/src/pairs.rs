//! `(proxy_host, front_end_host)` ordering for connection attempts (§4.3,
//! Design Note "Jump-host tunnelling"). The pair that worked last time is
//! tried first on the next connect; everything else follows in the
//! configured product order.

#[derive(Debug, Clone)]
pub struct PairSequence {
    proxies: Vec<String>,
    frontends: Vec<String>,
    last: Option<(String, String)>,
}

impl PairSequence {
    pub fn new(proxies: Vec<String>, frontends: Vec<String>) -> Self {
        Self {
            proxies,
            frontends,
            last: None,
        }
    }

    /// All `(proxy, front_end)` pairs for one round, memoised pair first.
    pub fn ordered(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .proxies
            .iter()
            .flat_map(|proxy| {
                self.frontends
                    .iter()
                    .map(move |frontend| (proxy.clone(), frontend.clone()))
            })
            .collect();

        if let Some(last) = &self.last {
            if let Some(pos) = pairs.iter().position(|pair| pair == last) {
                let memoised = pairs.remove(pos);
                pairs.insert(0, memoised);
            }
        }

        pairs
    }

    pub fn remember(&mut self, proxy: &str, frontend: &str) {
        self.last = Some((proxy.to_string(), frontend.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_covers_every_combination() {
        let seq = PairSequence::new(
            vec!["p1".into(), "p2".into()],
            vec!["f1".into(), "f2".into()],
        );
        let pairs = seq.ordered();
        assert_eq!(pairs.len(), 4);
        assert!(pairs.contains(&("p1".to_string(), "f1".to_string())));
        assert!(pairs.contains(&("p2".to_string(), "f2".to_string())));
    }

    #[test]
    fn memoised_pair_is_tried_first() {
        let mut seq = PairSequence::new(
            vec!["p1".into(), "p2".into()],
            vec!["f1".into(), "f2".into()],
        );
        seq.remember("p2", "f1");
        let pairs = seq.ordered();
        assert_eq!(pairs[0], ("p2".to_string(), "f1".to_string()));
        assert_eq!(pairs.len(), 4);
    }

    #[test]
    fn no_memoised_pair_keeps_product_order() {
        let seq = PairSequence::new(vec!["p1".into()], vec!["f1".into(), "f2".into()]);
        assert_eq!(
            seq.ordered(),
            vec![
                ("p1".to_string(), "f1".to_string()),
                ("p1".to_string(), "f2".to_string())
            ]
        );
    }
}
