//! Asynchronous client for one Archiver Appliance.

use std::sync::Arc;

use async_stream::try_stream;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::Config;
use crate::decoder::{DecoderOptions, StreamDecoder};
use crate::error::{Error, Result};
use crate::search::{self, MatchMode};
use crate::time::{self, TimeSpec};
use crate::values::Batch;

/// Handle to one appliance. Cheap to clone; all clones share the HTTP
/// connection pool and the request gate.
#[derive(Clone)]
pub struct Archive {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    /// Bounded gate on concurrent requests; waiters queue in FIFO order.
    gate: Arc<Semaphore>,
    conf: Config,
    /// `.../mgmt/bpl`, after localhost rewriting.
    mgmt_url: String,
    /// `.../data/getData.raw`, after localhost rewriting.
    data_url: String,
}

impl Archive {
    /// Fetch the appliance info from the configured entry URL and build a
    /// client around the advertised component URLs.
    pub async fn connect(conf: Config) -> Result<Archive> {
        let entry = Url::parse(&conf.appliance_url())
            .map_err(|e| Error::Config(format!("bad appliance URL: {e}")))?;
        let http = reqwest::Client::builder().build()?;

        let resp = check_status(http.get(entry.clone()).send().await?)?;
        let mut info: serde_json::Map<String, Value> = resp.json().await?;
        rewrite_local_hosts(&mut info, &entry);
        log::debug!("server info from {entry}: {info:?}");

        let mgmt_url = info_url(&info, "mgmtURL")?;
        let retrieval = info_url(&info, "retrievalURL")
            .map(|url| url.replace("/bpl", ""))
            .or_else(|_| info_url(&info, "dataRetrievalURL"))?;
        let data_url = format!("{}/data/getData.raw", retrieval.trim_end_matches('/'));

        Ok(Archive {
            inner: Arc::new(Inner {
                http,
                gate: Arc::new(Semaphore::new(conf.maxquery)),
                conf,
                mgmt_url,
                data_url,
            }),
        })
    }

    /// Look up archived PV names matching `pattern`.
    pub async fn search(&self, pattern: &str, mode: MatchMode) -> Result<Vec<String>> {
        let (regex, op) = search::normalize(pattern, mode);
        log::debug!("searching for {regex:?}");

        let url = format!("{}/getAllPVs", self.inner.mgmt_url);
        let _permit = self.acquire().await;
        let resp = self.get(&url, &[("regex", regex.as_str())]).await?;
        let pvs: Vec<String> = resp.json().await?;

        Ok(match op {
            Some(op) => pvs.into_iter().map(|pv| format!("{op}({pv})")).collect(),
            None => pvs,
        })
    }

    /// [`search`](Archive::search) with [`MatchMode::Regex`].
    pub async fn grep(&self, pattern: &str) -> Result<Vec<String>> {
        self.search(pattern, MatchMode::Regex).await
    }

    /// Stream raw samples for `pv` in the given window as decoded batches
    /// of up to `chunk` (default: the configured `chunksize`) samples.
    ///
    /// The request gate is held from the request until the response body is
    /// fully consumed.
    pub fn raw_iter(
        &self,
        pv: &str,
        start: TimeSpec,
        end: TimeSpec,
        chunk: Option<usize>,
    ) -> impl Stream<Item = Result<Batch>> + Send + 'static {
        let this = self.clone();
        let pv = pv.to_string();
        let threshold = chunk.unwrap_or(this.inner.conf.chunksize);

        try_stream! {
            let (t0, t1) = time::resolve_interval(start, end, Utc::now());
            let query = data_query(&pv, t0, t1);

            let _permit = this.acquire().await;
            let resp = this.get(&this.inner.data_url, &query).await?;

            let mut decoder = StreamDecoder::new(DecoderOptions {
                threshold,
                consolidate: true,
            });
            let mut body = resp.bytes_stream();
            while let Some(blob) = body.next().await {
                if decoder.process(&blob?, false)? {
                    for batch in decoder.take_output() {
                        log::debug!("yield batch of {} samples", batch.rows());
                        yield batch;
                    }
                }
            }
            if decoder.process(&[], true)? {
                for batch in decoder.take_output() {
                    log::debug!("yield final batch of {} samples", batch.rows());
                    yield batch;
                }
            }
        }
    }

    /// Fetch raw samples and accumulate them into a single batch. None when
    /// the window holds no samples. Requires that the PV's type and shape
    /// did not change over the window.
    pub async fn raw(
        &self,
        pv: &str,
        start: TimeSpec,
        end: TimeSpec,
        chunk: Option<usize>,
    ) -> Result<Option<Batch>> {
        let stream = self.raw_iter(pv, start, end, chunk);
        futures::pin_mut!(stream);

        let mut acc: Option<Batch> = None;
        while let Some(batch) = stream.next().await {
            let batch = batch?;
            match &mut acc {
                None => acc = Some(batch),
                Some(acc) => acc.append(batch)?,
            }
        }
        Ok(acc)
    }

    /// Request server-side binned data suitable for a simple plot,
    /// returning roughly `count` samples. Falls back to a raw query when
    /// the window is too short to bin.
    pub async fn plot(
        &self,
        pv: &str,
        start: TimeSpec,
        end: TimeSpec,
        count: Option<usize>,
    ) -> Result<Option<Batch>> {
        let (t0, t1) = time::resolve_interval(start, end, Utc::now());
        let count = count.unwrap_or(self.inner.conf.defaultcount);

        let name = binned_pv_name(pv, t0, t1, count);
        if name == pv {
            log::info!("window too short to bin {count} samples, fetching {pv} raw");
        }
        self.raw(&name, TimeSpec::Absolute(t0), TimeSpec::Absolute(t1), None)
            .await
    }

    async fn acquire(&self) -> OwnedSemaphorePermit {
        self.inner
            .gate
            .clone()
            .acquire_owned()
            .await
            .expect("request gate closed")
    }

    async fn get<Q: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Q,
    ) -> Result<reqwest::Response> {
        log::debug!("GET {url}");
        check_status(self.inner.http.get(url).query(query).send().await?)
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.as_u16() >= 400 {
        return Err(Error::Http {
            status: status.as_u16(),
            url: resp.url().to_string(),
        });
    }
    Ok(resp)
}

fn info_url(info: &serde_json::Map<String, Value>, key: &str) -> Result<String> {
    info.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("appliance info is missing {key}")))
}

/// Appliances installed with default settings advertise their component
/// URLs as `localhost`; rewrite those to the host the entry URL reached.
fn rewrite_local_hosts(info: &mut serde_json::Map<String, Value>, entry: &Url) {
    let Some(host) = entry.host_str() else {
        return;
    };
    for value in info.values_mut() {
        let Some(s) = value.as_str() else { continue };
        if !s.starts_with("http://") && !s.starts_with("https://") {
            continue;
        }
        let Ok(mut url) = Url::parse(s) else { continue };
        if matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"))
            && url.set_host(Some(host)).is_ok()
        {
            *value = Value::String(url.to_string());
        }
    }
}

/// Query parameters of one `getData.raw` request.
fn data_query(pv: &str, t0: DateTime<Utc>, t1: DateTime<Utc>) -> [(&'static str, String); 3] {
    [
        ("pv", pv.to_string()),
        ("from", time::iso_string(t0)),
        ("to", time::iso_string(t1)),
    ]
}

/// Wrap `pv` in the server-side binning operator sized so the window yields
/// about `target` samples; the plain name when the window is too short.
fn binned_pv_name(pv: &str, t0: DateTime<Utc>, t1: DateTime<Utc>, target: usize) -> String {
    let seconds = (t1 - t0).num_seconds();
    if seconds <= 0 || target == 0 {
        return pv.to_string();
    }
    let bin = (seconds as f64 / target as f64).ceil() as i64;
    if bin <= 1 {
        pv.to_string()
    } else {
        format!("caplotbinning_{bin}({pv})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn query_parameters() {
        let q = data_query("X:Y", at(1423234604), at(1423238204));
        assert_eq!(
            q,
            [
                ("pv", "X:Y".to_string()),
                ("from", "2015-02-06T14:56:44.000000Z".to_string()),
                ("to", "2015-02-06T15:56:44.000000Z".to_string()),
            ]
        );
    }

    #[test]
    fn binning_sizes_the_operator() {
        // one hour at 1000 samples -> 4 second bins
        assert_eq!(
            binned_pv_name("RF:V", at(0), at(3600), 1000),
            "caplotbinning_4(RF:V)"
        );
        // window shorter than one bin falls through to raw
        assert_eq!(binned_pv_name("RF:V", at(0), at(500), 1000), "RF:V");
        assert_eq!(binned_pv_name("RF:V", at(0), at(0), 1000), "RF:V");
    }

    #[test]
    fn localhost_urls_take_the_entry_host() {
        let entry = Url::parse("http://aa.example.net:17665/mgmt/bpl/getApplianceInfo").unwrap();
        let mut info = serde_json::Map::new();
        info.insert("identity".into(), Value::String("appliance0".into()));
        info.insert(
            "mgmtURL".into(),
            Value::String("http://localhost:17665/mgmt/bpl".into()),
        );
        info.insert(
            "retrievalURL".into(),
            Value::String("http://127.0.0.1:17668/retrieval/bpl".into()),
        );
        info.insert(
            "etlURL".into(),
            Value::String("http://etl.example.net:17665/etl/bpl".into()),
        );

        rewrite_local_hosts(&mut info, &entry);

        assert_eq!(
            info["mgmtURL"],
            Value::String("http://aa.example.net:17665/mgmt/bpl".into())
        );
        assert_eq!(
            info["retrievalURL"],
            Value::String("http://aa.example.net:17668/retrieval/bpl".into())
        );
        // non-local hosts are left alone
        assert_eq!(
            info["etlURL"],
            Value::String("http://etl.example.net:17665/etl/bpl".into())
        );
    }

    #[test]
    fn retrieval_url_loses_bpl() {
        let mut info = serde_json::Map::new();
        info.insert(
            "retrievalURL".into(),
            Value::String("http://aa:17668/retrieval/bpl".into()),
        );
        let retrieval = info_url(&info, "retrievalURL")
            .map(|url| url.replace("/bpl", ""))
            .unwrap();
        assert_eq!(retrieval, "http://aa:17668/retrieval");

        assert!(matches!(
            info_url(&info, "mgmtURL"),
            Err(Error::Config(_))
        ));
    }
}
