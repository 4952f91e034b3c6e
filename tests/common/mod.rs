#![allow(dead_code)]

use cat_mt_assist::logging::{DebugFlag, Logger};
use cat_mt_assist::providers::{self, DeepL, DeepSeek, ProviderImpl, ProviderKind};
use cat_mt_assist::service::{ServiceEntry, ServiceRegistry};
use cat_mt_assist::{AppContext, Coordinator, Settings, StorageArea};

pub const PAGE: &str = r#"<html><body><table><tbody>
  <tr class="segment"><td class="original"><span class="content">Good morning</span></td>
      <td class="translation chinese"><span class="content" lang="zh">早上好</span></td></tr>
  <tr class="activeSegment"><td class="original"><span class="content">Hello   world</span></td>
      <td class="translation chinese"><div class="textarea" contenteditable="true"></div></td></tr>
  <tr id="searchResultsRow"><td><div><div><div class="vocabulary col-md-3"><ul>
      <li><div><a>Hello</a></div><div><span class="termField" lang="zh">你好</span></div></li>
  </ul></div></div></div></td></tr>
</tbody></table></body></html>"#;

/// Registry whose DeepSeek and DeepL clients talk to `base_url`.
pub fn mock_registry(storage: &StorageArea, base_url: &str) -> ServiceRegistry {
    let debug = DebugFlag::watch(storage);
    let settings = Settings::default();
    let mut registry = ServiceRegistry::new();
    for kind in ProviderKind::ALL {
        let provider = match kind {
            ProviderKind::DeepSeek => ProviderImpl::DeepSeek(
                DeepSeek::new(
                    reqwest::Client::new(),
                    storage,
                    Logger::new("[DeepSeek]", debug.clone()),
                )
                .unwrap()
                .with_base_url(base_url),
            ),
            ProviderKind::DeepL => ProviderImpl::DeepL(
                DeepL::new(
                    reqwest::Client::new(),
                    storage,
                    Logger::new("[DeepL]", debug.clone()),
                )
                .unwrap()
                .with_base_url(base_url),
            ),
            other => providers::build_provider(other, storage, &debug, &settings).unwrap(),
        };
        registry
            .register(kind.as_str(), ServiceEntry::new(provider))
            .unwrap();
    }
    registry
}

pub fn mock_coordinator(storage: &StorageArea, base_url: &str) -> Coordinator {
    let context = AppContext::init(Settings::default(), storage.clone())
        .unwrap()
        .with_registry(mock_registry(storage, base_url));
    Coordinator::new(context)
}
