use crate::{
    catalog::{search, CatalogApi, CatalogFilters},
    error::ApiError,
    keystore::KeyStore,
    models::{Category, Message, ModelDescriptor, Tier},
    playground::{AudioFile, ImageOptions, PlaygroundApi, SpeechOptions, TextOptions},
    telemetry,
};

pub const NO_RESPONSE: &str = "No response generated";
pub const CATALOG_LOAD_FAILED: &str = "Failed to load models. Please try again later.";

/**
 * \brief 提示消息（相当于界面上的 toast / alert）。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn key_required() -> Self {
        Self {
            title: "API Key Required".to_string(),
            description: ApiError::MissingCredential.user_message(""),
        }
    }

    fn from_error(err: &ApiError, fallback: &str) -> Self {
        Self {
            title: "Error".to_string(),
            description: err.user_message(fallback),
        }
    }
}

/**
 * \brief 一次提交的结果。
 */
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /** \brief 输入为空，未做任何事 */
    Skipped,
    /** \brief 缺少 API Key，未发出请求 */
    NeedsKey(Notice),
    Done(T),
    Failed(Notice),
}

impl<T> Outcome<T> {
    pub fn notice(&self) -> Option<&Notice> {
        match self {
            Outcome::NeedsKey(n) | Outcome::Failed(n) => Some(n),
            _ => None,
        }
    }
}

/**
 * \brief 选中模型对应的 Playground 类型。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaygroundKind {
    Text,
    Image,
    Audio,
}

impl PlaygroundKind {
    /**
     * \brief 视频类暂无 Playground。
     */
    pub fn for_category(category: Category) -> Option<Self> {
        match category {
            Category::Text => Some(PlaygroundKind::Text),
            Category::Image => Some(PlaygroundKind::Image),
            Category::Audio => Some(PlaygroundKind::Audio),
            Category::Video => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlaygroundKind::Text => "Text Playground",
            PlaygroundKind::Image => "Image Playground",
            PlaygroundKind::Audio => "Audio Playground",
        }
    }

    /**
     * \brief 选中模型与当前 Playground 是否一致；无选中模型时不做判断。
     */
    pub fn accepts(self, selection: Option<&ModelDescriptor>) -> bool {
        selection
            .map(|m| PlaygroundKind::for_category(m.category) == Some(self))
            .unwrap_or(true)
    }
}

/**
 * \brief 出站模型 ID；未经目录进入时为空串。
 */
pub fn resolve_model_id(selection: Option<&ModelDescriptor>) -> String {
    selection.map(|m| m.model_id().to_string()).unwrap_or_default()
}

/**
 * \brief 页头信息，缺少选中模型时使用占位标签。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    pub description: String,
    pub tier: Option<String>,
}

fn header_for(selection: Option<&ModelDescriptor>, placeholder: &str) -> Header {
    Header {
        title: format!(
            "{} Playground",
            selection.map(|m| m.name.as_str()).unwrap_or(placeholder)
        ),
        description: selection.map(|m| m.description.clone()).unwrap_or_default(),
        tier: selection.map(|m| m.tier.label().to_string()),
    }
}

/**
 * \brief 模型信息面板中的条目。
 */
pub fn info_rows(selection: Option<&ModelDescriptor>) -> Vec<(String, String)> {
    let Some(model) = selection else {
        return vec![
            ("Type".to_string(), "N/A".to_string()),
            ("Context Window".to_string(), "N/A".to_string()),
        ];
    };
    let mut rows = vec![
        (
            "Type".to_string(),
            model.model_type.clone().unwrap_or_else(|| "N/A".to_string()),
        ),
        ("Context Window".to_string(), model.context_window_label()),
    ];
    if !model.features.is_empty() {
        rows.push(("Features".to_string(), model.feature_labels().join(", ")));
    }
    if let Some(provider) = model.canonical_provider() {
        if !provider.owned_by.is_empty() {
            rows.push(("Provider".to_string(), provider.owned_by.clone()));
        }
        if let Some(perf) = &provider.performance_metrics {
            rows.push(("Latency".to_string(), format!("{}s", perf.latency)));
            rows.push(("Throughput".to_string(), format!("{} t/s", perf.throughput)));
            rows.push(("Uptime".to_string(), format!("{}%", perf.uptime_percentage)));
        }
    }
    rows
}

/**
 * \brief 模型目录视图：服务端按档位/类型筛选，本地按关键字搜索。
 */
#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    filters: CatalogFilters,
    query: String,
    models: Vec<ModelDescriptor>,
    error: Option<String>,
}

impl CatalogView {
    /**
     * \brief 创建视图并立即加载一次。
     */
    pub async fn load<C>(api: &C, filters: CatalogFilters) -> Self
    where
        C: CatalogApi + ?Sized,
    {
        let mut view = Self {
            filters,
            ..Self::default()
        };
        view.refresh(api).await;
        view
    }

    pub async fn set_tier<C>(&mut self, api: &C, tier: Option<Tier>)
    where
        C: CatalogApi + ?Sized,
    {
        if self.filters.tier != tier {
            self.filters.tier = tier;
            self.refresh(api).await;
        }
    }

    pub async fn set_category<C>(&mut self, api: &C, category: Option<Category>)
    where
        C: CatalogApi + ?Sized,
    {
        if self.filters.category != category {
            self.filters.category = category;
            self.refresh(api).await;
        }
    }

    async fn refresh<C>(&mut self, api: &C)
    where
        C: CatalogApi + ?Sized,
    {
        self.error = None;
        match api.fetch_models(&self.filters).await {
            Ok(models) => self.models = models,
            Err(e) => {
                telemetry::log_error("catalog", &format!("fetch models failed: {}", e));
                self.models.clear();
                self.error = Some(CATALOG_LOAD_FAILED.to_string());
            }
        }
    }

    /**
     * \brief 更新关键字，不触发网络请求。
     */
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn filters(&self) -> CatalogFilters {
        self.filters
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn fetched(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn visible(&self) -> Vec<&ModelDescriptor> {
        search(&self.models, &self.query)
    }

    /**
     * \brief 选中一条可见记录，把完整描述交给 Playground。
     */
    pub fn select(&self, key: &str) -> Option<ModelDescriptor> {
        self.visible()
            .into_iter()
            .find(|m| m.base_model == key || m.name == key)
            .cloned()
    }
}

/**
 * \brief 文本对话 Playground。历史仅存在于本视图的生命周期内。
 */
#[derive(Debug, Clone, Default)]
pub struct TextPlayground {
    selection: Option<ModelDescriptor>,
    pub input: String,
    pub options: TextOptions,
    messages: Vec<Message>,
}

impl TextPlayground {
    pub fn new(selection: Option<ModelDescriptor>) -> Self {
        Self {
            selection,
            ..Self::default()
        }
    }

    pub fn header(&self) -> Header {
        header_for(self.selection.as_ref(), "Text Model")
    }

    pub fn model_id(&self) -> String {
        resolve_model_id(self.selection.as_ref())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn can_submit(&self) -> bool {
        !self.input.trim().is_empty()
    }

    /**
     * \brief 发送当前输入。
     * \details 用户消息先追加到历史；调用失败时撤回该消息并把原文放回输入框。
     */
    pub async fn submit<A>(&mut self, api: &A, keys: &KeyStore) -> Outcome<String>
    where
        A: PlaygroundApi + ?Sized,
    {
        if !self.can_submit() {
            return Outcome::Skipped;
        }
        if !keys.is_present() {
            telemetry::log_warn("playground.text", "submit without api key");
            return Outcome::NeedsKey(Notice::key_required());
        }

        let user = Message::user(std::mem::take(&mut self.input));
        self.messages.push(user);
        let model_id = self.model_id();
        telemetry::log_event(
            "playground.text",
            &format!("model={} history={}", model_id, self.messages.len()),
        );

        match api
            .text_completion(keys.get(), &model_id, &self.messages, &self.options)
            .await
        {
            Ok(content) => {
                let reply = content.unwrap_or_else(|| NO_RESPONSE.to_string());
                self.messages.push(Message::assistant(reply.clone()));
                Outcome::Done(reply)
            }
            Err(e) => {
                telemetry::log_error("playground.text", &e.to_string());
                if let Some(user) = self.messages.pop() {
                    self.input = user.content;
                }
                Outcome::Failed(Notice::from_error(&e, "Failed to get response from AI model"))
            }
        }
    }
}

/**
 * \brief 图片生成 Playground。
 */
#[derive(Debug, Clone, Default)]
pub struct ImagePlayground {
    selection: Option<ModelDescriptor>,
    pub prompt: String,
    pub options: ImageOptions,
    image_url: Option<String>,
}

impl ImagePlayground {
    pub fn new(selection: Option<ModelDescriptor>) -> Self {
        Self {
            selection,
            ..Self::default()
        }
    }

    pub fn header(&self) -> Header {
        header_for(self.selection.as_ref(), "Image Model")
    }

    pub fn model_id(&self) -> String {
        resolve_model_id(self.selection.as_ref())
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub async fn submit<A>(&mut self, api: &A, keys: &KeyStore) -> Outcome<String>
    where
        A: PlaygroundApi + ?Sized,
    {
        if self.prompt.trim().is_empty() {
            return Outcome::Skipped;
        }
        if !keys.is_present() {
            telemetry::log_warn("playground.image", "submit without api key");
            return Outcome::NeedsKey(Notice::key_required());
        }

        self.image_url = None;
        let model_id = self.model_id();
        telemetry::log_event("playground.image", &format!("model={}", model_id));

        let result = api
            .image_generation(keys.get(), &model_id, &self.prompt, &self.options)
            .await
            .and_then(|data| {
                data.into_iter()
                    .next()
                    .and_then(|r| r.url)
                    .ok_or_else(|| {
                        ApiError::MalformedResponse("Invalid response format".to_string())
                    })
            });

        match result {
            Ok(url) => {
                self.image_url = Some(url.clone());
                Outcome::Done(url)
            }
            Err(e) => {
                telemetry::log_error("playground.image", &e.to_string());
                Outcome::Failed(Notice::from_error(&e, "Failed to generate image"))
            }
        }
    }
}

/**
 * \brief 音频 Playground 的产出。
 */
#[derive(Debug, Clone, PartialEq)]
pub enum AudioOutput {
    Transcript(String),
    Speech(Vec<u8>),
}

/**
 * \brief 音频 Playground：按模型类型在转写与合成之间切换。
 */
#[derive(Debug, Clone, Default)]
pub struct AudioPlayground {
    selection: Option<ModelDescriptor>,
    pub input: String,
    pub options: SpeechOptions,
    output: Option<AudioOutput>,
}

impl AudioPlayground {
    pub fn new(selection: Option<ModelDescriptor>) -> Self {
        Self {
            selection,
            ..Self::default()
        }
    }

    pub fn header(&self) -> Header {
        header_for(self.selection.as_ref(), "Audio Model")
    }

    pub fn model_id(&self) -> String {
        resolve_model_id(self.selection.as_ref())
    }

    pub fn is_transcription(&self) -> bool {
        self.selection
            .as_ref()
            .map(ModelDescriptor::is_transcription)
            .unwrap_or(false)
    }

    pub fn output(&self) -> Option<&AudioOutput> {
        self.output.as_ref()
    }

    pub async fn transcribe<A>(
        &mut self,
        api: &A,
        keys: &KeyStore,
        file: AudioFile,
    ) -> Outcome<AudioOutput>
    where
        A: PlaygroundApi + ?Sized,
    {
        if file.bytes.is_empty() {
            return Outcome::Skipped;
        }
        if !keys.is_present() {
            telemetry::log_warn("playground.audio", "transcribe without api key");
            return Outcome::NeedsKey(Notice::key_required());
        }
        self.output = None;
        let model_id = self.model_id();
        telemetry::log_event(
            "playground.audio",
            &format!("transcribe model={} bytes={}", model_id, file.bytes.len()),
        );
        match api.audio_transcription(keys.get(), &model_id, file).await {
            Ok(text) => self.finish(AudioOutput::Transcript(text)),
            Err(e) => {
                telemetry::log_error("playground.audio", &e.to_string());
                Outcome::Failed(Notice::from_error(&e, "Failed to transcribe audio"))
            }
        }
    }

    pub async fn synthesize<A>(&mut self, api: &A, keys: &KeyStore) -> Outcome<AudioOutput>
    where
        A: PlaygroundApi + ?Sized,
    {
        if self.input.trim().is_empty() {
            return Outcome::Skipped;
        }
        if !keys.is_present() {
            telemetry::log_warn("playground.audio", "synthesize without api key");
            return Outcome::NeedsKey(Notice::key_required());
        }
        self.output = None;
        let model_id = self.model_id();
        telemetry::log_event(
            "playground.audio",
            &format!("synthesize model={} chars={}", model_id, self.input.chars().count()),
        );
        match api
            .audio_generation(keys.get(), &model_id, &self.input, &self.options)
            .await
        {
            Ok(bytes) => self.finish(AudioOutput::Speech(bytes)),
            Err(e) => {
                telemetry::log_error("playground.audio", &e.to_string());
                Outcome::Failed(Notice::from_error(&e, "Failed to generate speech"))
            }
        }
    }

    fn finish(&mut self, output: AudioOutput) -> Outcome<AudioOutput> {
        self.output = Some(output.clone());
        Outcome::Done(output)
    }
}

/**
 * \brief 选中模型后进入的 Playground，按类别分派。
 */
#[derive(Debug, Clone)]
pub enum Playground {
    Text(TextPlayground),
    Image(ImagePlayground),
    Audio(AudioPlayground),
}

impl Playground {
    /**
     * \brief 按模型类别打开对应 Playground；视频类返回 None。
     */
    pub fn open(selection: ModelDescriptor) -> Option<Self> {
        let playground = match PlaygroundKind::for_category(selection.category)? {
            PlaygroundKind::Text => Playground::Text(TextPlayground::new(Some(selection))),
            PlaygroundKind::Image => Playground::Image(ImagePlayground::new(Some(selection))),
            PlaygroundKind::Audio => Playground::Audio(AudioPlayground::new(Some(selection))),
        };
        Some(playground)
    }

    pub fn kind(&self) -> PlaygroundKind {
        match self {
            Playground::Text(_) => PlaygroundKind::Text,
            Playground::Image(_) => PlaygroundKind::Image,
            Playground::Audio(_) => PlaygroundKind::Audio,
        }
    }

    pub fn header(&self) -> Header {
        match self {
            Playground::Text(view) => view.header(),
            Playground::Image(view) => view.header(),
            Playground::Audio(view) => view.header(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::keystore::store_with;
    use crate::models::fixtures::{dalle, gpt4o, whisper};
    use crate::playground::ImageResult;

    /** \brief 记录调用并按队列返回预设结果的假后端。 */
    #[derive(Default)]
    struct FakeBackend {
        calls: Mutex<Vec<(String, String, String)>>,
        text_replies: Mutex<VecDeque<Result<Option<String>, ApiError>>>,
        image_replies: Mutex<VecDeque<Result<Vec<ImageResult>, ApiError>>>,
        catalog_fail: bool,
    }

    impl FakeBackend {
        fn record(&self, op: &str, credential: &str, model_id: &str) {
            self.calls.lock().expect("lock").push((
                op.to_string(),
                credential.to_string(),
                model_id.to_string(),
            ));
        }

        fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl PlaygroundApi for FakeBackend {
        async fn text_completion(
            &self,
            credential: &str,
            model_id: &str,
            messages: &[Message],
            _options: &TextOptions,
        ) -> Result<Option<String>, ApiError> {
            self.record(&format!("text:{}", messages.len()), credential, model_id);
            self.text_replies
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(Ok(Some("ok".into())))
        }

        async fn image_generation(
            &self,
            credential: &str,
            model_id: &str,
            _prompt: &str,
            _options: &ImageOptions,
        ) -> Result<Vec<ImageResult>, ApiError> {
            self.record("image", credential, model_id);
            self.image_replies
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(vec![ImageResult {
                        url: Some("https://img.example/a.png".into()),
                        revised_prompt: None,
                    }])
                })
        }

        async fn audio_transcription(
            &self,
            credential: &str,
            model_id: &str,
            _file: AudioFile,
        ) -> Result<String, ApiError> {
            self.record("transcribe", credential, model_id);
            Ok("transcribed".into())
        }

        async fn audio_generation(
            &self,
            credential: &str,
            model_id: &str,
            _input: &str,
            _options: &SpeechOptions,
        ) -> Result<Vec<u8>, ApiError> {
            self.record("speech", credential, model_id);
            Ok(vec![0xff, 0xfb])
        }
    }

    #[async_trait]
    impl CatalogApi for FakeBackend {
        async fn fetch_models(
            &self,
            filters: &CatalogFilters,
        ) -> Result<Vec<ModelDescriptor>, ApiError> {
            self.record(
                "catalog",
                filters.tier.map(|t| t.as_str()).unwrap_or("all"),
                filters.category.map(|c| c.as_str()).unwrap_or("all"),
            );
            if self.catalog_fail {
                return Err(ApiError::Backend {
                    status: 500,
                    detail: None,
                });
            }
            Ok(vec![gpt4o(), whisper(), dalle()])
        }

        async fn fetch_model(&self, _name: &str) -> Result<ModelDescriptor, ApiError> {
            Ok(gpt4o())
        }
    }

    fn backend_error(detail: &str) -> ApiError {
        ApiError::Backend {
            status: 500,
            detail: Some(detail.to_string()),
        }
    }

    #[tokio::test]
    async fn test_catalog_view_fetches_only_on_filter_change() {
        let api = FakeBackend::default();
        let mut view = CatalogView::load(&api, CatalogFilters::default()).await;
        assert_eq!(view.visible().len(), 3);

        view.set_query("ADVANCED");
        let names: Vec<_> = view.visible().iter().map(|m| m.name.clone()).collect();
        assert_eq!(names, vec!["GPT-4o", "DALL-E 3"]);
        view.set_query("");
        assert_eq!(view.visible().len(), 3);

        view.set_tier(&api, Some(Tier::Pro)).await;
        view.set_tier(&api, Some(Tier::Pro)).await;
        view.set_category(&api, Some(Category::Text)).await;

        let calls = api.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1], ("catalog".into(), "pro".into(), "all".into()));
        assert_eq!(calls[2], ("catalog".into(), "pro".into(), "text".into()));
    }

    #[tokio::test]
    async fn test_catalog_view_reports_load_failure() {
        let api = FakeBackend {
            catalog_fail: true,
            ..FakeBackend::default()
        };
        let view = CatalogView::load(&api, CatalogFilters::default()).await;
        assert_eq!(view.error(), Some(CATALOG_LOAD_FAILED));
        assert!(view.visible().is_empty());
    }

    #[tokio::test]
    async fn test_select_hands_over_full_descriptor() {
        let api = FakeBackend::default();
        let mut view = CatalogView::load(&api, CatalogFilters::default()).await;
        let picked = view.select("gpt-4o").expect("selected");
        assert_eq!(picked, gpt4o());
        assert_eq!(PlaygroundKind::for_category(picked.category), Some(PlaygroundKind::Text));

        view.set_query("whisper");
        assert!(view.select("gpt-4o").is_none());
        assert_eq!(PlaygroundKind::for_category(Category::Video), None);
    }

    #[test]
    fn test_open_routes_by_category() {
        let text = Playground::open(gpt4o()).expect("text");
        assert_eq!(text.kind(), PlaygroundKind::Text);
        assert_eq!(text.header().title, "GPT-4o Playground");

        let image = Playground::open(dalle()).expect("image");
        assert_eq!(image.kind(), PlaygroundKind::Image);

        match Playground::open(whisper()).expect("audio") {
            Playground::Audio(view) => {
                assert!(view.is_transcription());
                assert_eq!(view.model_id(), "provider-3/whisper-1");
            }
            other => panic!("unexpected {:?}", other.kind()),
        }

        let mut clip = gpt4o();
        clip.category = Category::Video;
        assert!(Playground::open(clip).is_none());
    }

    #[test]
    fn test_kind_accepts_matching_selection() {
        assert!(PlaygroundKind::Text.accepts(Some(&gpt4o())));
        assert!(!PlaygroundKind::Image.accepts(Some(&gpt4o())));
        assert!(PlaygroundKind::Audio.accepts(Some(&whisper())));
        assert!(PlaygroundKind::Image.accepts(None));
        assert_eq!(PlaygroundKind::Audio.label(), "Audio Playground");
    }

    #[tokio::test]
    async fn test_text_submit_appends_reply() {
        let api = FakeBackend::default();
        let keys = store_with("sk-test");
        let mut view = TextPlayground::new(Some(gpt4o()));
        view.input = "hello".into();

        let outcome = view.submit(&api, &keys).await;
        assert_eq!(outcome, Outcome::Done("ok".into()));
        assert_eq!(
            view.messages(),
            &[Message::user("hello"), Message::assistant("ok")]
        );
        assert!(view.input.is_empty());
        assert_eq!(
            api.calls(),
            vec![("text:1".into(), "sk-test".into(), "provider-1/gpt-4o".into())]
        );
    }

    #[tokio::test]
    async fn test_text_submit_failure_rolls_back() {
        let api = FakeBackend::default();
        api.text_replies.lock().expect("lock").extend([
            Ok(Some("first answer".into())),
            Err(backend_error("rate limited")),
        ]);
        let keys = store_with("sk-test");
        let mut view = TextPlayground::new(Some(gpt4o()));

        view.input = "one".into();
        view.submit(&api, &keys).await;
        let before = view.messages().to_vec();

        view.input = "two".into();
        let outcome = view.submit(&api, &keys).await;
        assert_eq!(
            outcome,
            Outcome::Failed(Notice {
                title: "Error".into(),
                description: "rate limited".into(),
            })
        );
        assert_eq!(view.messages(), before.as_slice());
        assert_eq!(view.input, "two");
        // 第二次调用带上了完整历史加新消息。
        assert_eq!(api.calls()[1].0, "text:3");
    }

    #[tokio::test]
    async fn test_text_submit_empty_reply_uses_placeholder() {
        let api = FakeBackend::default();
        api.text_replies.lock().expect("lock").push_back(Ok(None));
        let keys = store_with("sk-test");
        let mut view = TextPlayground::new(None);
        view.input = "hi".into();
        assert_eq!(view.submit(&api, &keys).await, Outcome::Done(NO_RESPONSE.into()));
        assert_eq!(api.calls()[0].2, "");
        assert_eq!(view.header().title, "Text Model Playground");
    }

    #[tokio::test]
    async fn test_blank_input_and_missing_key_make_no_calls() {
        let api = FakeBackend::default();
        let with_key = store_with("sk-test");
        let no_key = store_with("");

        let mut text = TextPlayground::new(Some(gpt4o()));
        text.input = "   ".into();
        assert_eq!(text.submit(&api, &with_key).await, Outcome::Skipped);

        text.input = "hello".into();
        let outcome = text.submit(&api, &no_key).await;
        assert_eq!(outcome, Outcome::NeedsKey(Notice::key_required()));
        assert!(text.messages().is_empty());
        assert_eq!(text.input, "hello");

        let mut image = ImagePlayground::new(Some(dalle()));
        image.prompt = "a lighthouse at dusk".into();
        let outcome = image.submit(&api, &no_key).await;
        assert!(matches!(outcome, Outcome::NeedsKey(_)));
        assert_eq!(outcome.notice().map(|n| n.title.as_str()), Some("API Key Required"));

        let mut audio = AudioPlayground::new(Some(whisper()));
        let file = AudioFile {
            file_name: "a.wav".into(),
            mime_type: None,
            bytes: vec![1],
        };
        assert!(matches!(
            audio.transcribe(&api, &no_key, file).await,
            Outcome::NeedsKey(_)
        ));

        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_image_submit_success_and_malformed() {
        let api = FakeBackend::default();
        api.image_replies.lock().expect("lock").extend([
            Ok(vec![ImageResult {
                url: Some("https://img.example/fox.png".into()),
                revised_prompt: None,
            }]),
            Ok(vec![ImageResult {
                url: None,
                revised_prompt: None,
            }]),
            Err(backend_error("content policy")),
        ]);
        let keys = store_with("sk-test");
        let mut view = ImagePlayground::new(Some(dalle()));
        view.prompt = "a fox".into();

        assert_eq!(
            view.submit(&api, &keys).await,
            Outcome::Done("https://img.example/fox.png".into())
        );
        assert_eq!(view.image_url(), Some("https://img.example/fox.png"));

        let outcome = view.submit(&api, &keys).await;
        assert_eq!(
            outcome.notice().map(|n| n.description.as_str()),
            Some("Failed to generate image")
        );
        assert_eq!(view.image_url(), None);

        let outcome = view.submit(&api, &keys).await;
        assert_eq!(
            outcome.notice().map(|n| n.description.as_str()),
            Some("content policy")
        );
        assert_eq!(api.calls()[0].2, "dall-e-3");
    }

    #[tokio::test]
    async fn test_first_provider_id_used_for_every_call() {
        let api = FakeBackend::default();
        let keys = store_with("sk-test");
        let model = gpt4o();
        assert_eq!(model.proxy_providers.len(), 2);

        let mut text = TextPlayground::new(Some(model.clone()));
        text.input = "hi".into();
        text.submit(&api, &keys).await;

        let mut image = ImagePlayground::new(Some(model.clone()));
        image.prompt = "p".into();
        image.submit(&api, &keys).await;

        let mut audio = AudioPlayground::new(Some(model));
        audio.input = "say hi".into();
        audio.synthesize(&api, &keys).await;
        audio
            .transcribe(
                &api,
                &keys,
                AudioFile {
                    file_name: "a.mp3".into(),
                    mime_type: None,
                    bytes: vec![1, 2],
                },
            )
            .await;

        let calls = api.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|(_, _, id)| id == "provider-1/gpt-4o"));
    }

    #[tokio::test]
    async fn test_audio_modes() {
        let api = FakeBackend::default();
        let keys = store_with("sk-test");

        let mut stt = AudioPlayground::new(Some(whisper()));
        assert!(stt.is_transcription());
        let outcome = stt
            .transcribe(
                &api,
                &keys,
                AudioFile {
                    file_name: "a.mp3".into(),
                    mime_type: Some("audio/mpeg".into()),
                    bytes: vec![9],
                },
            )
            .await;
        assert_eq!(outcome, Outcome::Done(AudioOutput::Transcript("transcribed".into())));
        assert_eq!(stt.output(), Some(&AudioOutput::Transcript("transcribed".into())));

        let mut tts = AudioPlayground::new(None);
        assert!(!tts.is_transcription());
        assert_eq!(tts.synthesize(&api, &keys).await, Outcome::Skipped);
        tts.input = "hello".into();
        assert_eq!(
            tts.synthesize(&api, &keys).await,
            Outcome::Done(AudioOutput::Speech(vec![0xff, 0xfb]))
        );
        assert_eq!(tts.header().title, "Audio Model Playground");
        assert_eq!(tts.header().tier, None);
    }

    #[test]
    fn test_info_rows_with_and_without_selection() {
        let rows = info_rows(Some(&gpt4o()));
        assert!(rows.contains(&("Context Window".to_string(), "128,000 tokens".to_string())));
        assert!(rows.contains(&("Latency".to_string(), "2-4s".to_string())));
        assert!(rows.contains(&("Throughput".to_string(), "45 t/s".to_string())));
        assert!(rows.contains(&("Uptime".to_string(), "99.5%".to_string())));

        let empty = info_rows(None);
        assert!(empty.iter().all(|(_, v)| v == "N/A"));

        let header = header_for(Some(&gpt4o()), "Text Model");
        assert_eq!(header.title, "GPT-4o Playground");
        assert_eq!(header.tier.as_deref(), Some("Pro Tier"));
    }
}
