//! Lookup tables for name obfuscation.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Romanisations for the common ideographs found in media titles.
static PINYIN: &[(char, &str)] = &[
    ('国', "guo"), ('产', "chan"), ('剧', "ju"), ('集', "ji"), ('电', "dian"), ('影', "ying"),
    ('视', "shi"), ('频', "pin"), ('综', "zong"), ('艺', "yi"), ('动', "dong"), ('画', "hua"),
    ('纪', "ji"), ('录', "lu"), ('片', "pian"), ('短', "duan"), ('体', "ti"), ('育', "yu"),
    ('港', "gang"), ('台', "tai"), ('日', "ri"), ('韩', "han"), ('美', "mei"), ('英', "ying"),
    ('法', "fa"), ('德', "de"), ('欧', "ou"), ('亚', "ya"), ('洲', "zhou"), ('内', "nei"),
    ('陆', "lu"), ('地', "di"), ('区', "qu"), ('本', "ben"), ('土', "tu"), ('一', "yi"),
    ('二', "er"), ('三', "san"), ('四', "si"), ('五', "wu"), ('六', "liu"), ('七', "qi"),
    ('八', "ba"), ('九', "jiu"), ('十', "shi"), ('百', "bai"), ('千', "qian"), ('万', "wan"),
    ('大', "da"), ('小', "xiao"), ('中', "zhong"), ('新', "xin"), ('老', "lao"), ('好', "hao"),
    ('坏', "huai"), ('长', "chang"), ('高', "gao"), ('低', "di"), ('上', "shang"), ('下', "xia"),
    ('前', "qian"), ('后', "hou"), ('左', "zuo"), ('右', "you"), ('东', "dong"), ('南', "nan"),
    ('西', "xi"), ('北', "bei"), ('里', "li"), ('外', "wai"), ('生', "sheng"), ('死', "si"),
    ('活', "huo"), ('命', "ming"), ('人', "ren"), ('女', "nv"), ('男', "nan"), ('子', "zi"),
    ('儿', "er"), ('童', "tong"), ('王', "wang"), ('妃', "fei"), ('君', "jun"), ('臣', "chen"),
    ('将', "jiang"), ('军', "jun"), ('兵', "bing"), ('士', "shi"), ('侠', "xia"), ('客', "ke"),
    ('贼', "zei"), ('盗', "dao"), ('匪', "fei"), ('爱', "ai"), ('恨', "hen"), ('情', "qing"),
    ('欲', "yu"), ('望', "wang"), ('思', "si"), ('念', "nian"), ('想', "xiang"), ('梦', "meng"),
    ('幻', "huan"), ('喜', "xi"), ('怒', "nu"), ('哀', "ai"), ('乐', "le"), ('悲', "bei"),
    ('欢', "huan"), ('笑', "xiao"), ('哭', "ku"), ('泪', "lei"), ('天', "tian"), ('山', "shan"),
    ('水', "shui"), ('火', "huo"), ('风', "feng"), ('雨', "yu"), ('雷', "lei"), ('云', "yun"),
    ('雪', "xue"), ('月', "yue"), ('星', "xing"), ('辰', "chen"), ('光', "guang"), ('明', "ming"),
    ('暗', "an"), ('夜', "ye"), ('晨', "chen"), ('昏', "hun"), ('海', "hai"), ('江', "jiang"),
    ('河', "he"), ('湖', "hu"), ('溪', "xi"), ('树', "shu"), ('林', "lin"), ('森', "sen"),
    ('花', "hua"), ('草', "cao"), ('红', "hong"), ('黄', "huang"), ('蓝', "lan"), ('绿', "lv"),
    ('青', "qing"), ('紫', "zi"), ('白', "bai"), ('黑', "hei"), ('灰', "hui"), ('金', "jin"),
    ('银', "yin"), ('彩', "cai"), ('色', "se"), ('龙', "long"), ('凤', "feng"), ('虎', "hu"),
    ('狼', "lang"), ('豹', "bao"), ('狮', "shi"), ('鹰', "ying"), ('熊', "xiong"), ('鸟', "niao"),
    ('马', "ma"), ('牛', "niu"), ('羊', "yang"), ('犬', "quan"), ('猫', "mao"), ('鼠', "shu"),
    ('猪', "zhu"), ('鸡', "ji"), ('鸭', "ya"), ('鱼', "yu"), ('虫', "chong"), ('蛇', "she"),
    ('龟', "gui"), ('鹿', "lu"), ('象', "xiang"), ('剑', "jian"), ('刀', "dao"), ('枪', "qiang"),
    ('炮', "pao"), ('弓', "gong"), ('箭', "jian"), ('盾', "dun"), ('甲', "jia"), ('战', "zhan"),
    ('争', "zheng"), ('打', "da"), ('杀', "sha"), ('斗', "dou"), ('伤', "shang"), ('春', "chun"),
    ('夏', "xia"), ('秋', "qiu"), ('冬', "dong"), ('年', "nian"), ('时', "shi"), ('分', "fen"),
    ('秒', "miao"), ('今', "jin"), ('昨', "zuo"), ('早', "zao"), ('晚', "wan"), ('午', "wu"),
    ('夕', "xi"), ('朝', "zhao"), ('暮', "mu"), ('的', "de"), ('了', "le"), ('在', "zai"),
    ('是', "shi"), ('我', "wo"), ('你', "ni"), ('他', "ta"), ('她', "ta"), ('它', "ta"),
    ('们', "men"), ('这', "zhe"), ('那', "na"), ('什', "shen"), ('么', "me"), ('吗', "ma"),
    ('呢', "ne"), ('啊', "a"), ('哦', "o"), ('嗯', "en"), ('吧', "ba"), ('家', "jia"),
    ('城', "cheng"), ('市', "shi"), ('村', "cun"), ('镇', "zhen"), ('县', "xian"), ('省', "sheng"),
    ('州', "zhou"), ('都', "du"), ('京', "jing"), ('沪', "hu"), ('澳', "ao"), ('学', "xue"),
    ('校', "xiao"), ('院', "yuan"), ('堂', "tang"), ('馆', "guan"), ('店', "dian"), ('厂', "chang"),
    ('场', "chang"), ('园', "yuan"), ('宫', "gong"), ('府', "fu"), ('室', "shi"), ('厅', "ting"),
    ('楼', "lou"), ('塔', "ta"), ('门', "men"), ('窗', "chuang"), ('墙', "qiang"), ('路', "lu"),
    ('街', "jie"), ('道', "dao"), ('桥', "qiao"), ('书', "shu"), ('文', "wen"), ('字', "zi"),
    ('言', "yan"), ('语', "yu"), ('话', "hua"), ('说', "shuo"), ('讲', "jiang"), ('读', "du"),
    ('写', "xie"), ('手', "shou"), ('足', "zu"), ('头', "tou"), ('目', "mu"), ('耳', "er"),
    ('口', "kou"), ('鼻', "bi"), ('身', "shen"), ('心', "xin"), ('脑', "nao"), ('血', "xue"),
    ('肉', "rou"), ('骨', "gu"), ('皮', "pi"), ('毛', "mao"), ('双', "shuang"), ('轨', "gui"),
    ('意', "yi"), ('狙', "ju"), ('击', "ji"), ('蝴', "hu"), ('蝶', "die"), ('超', "chao"),
    ('感', "gan"), ('迷', "mi"), ('闻', "wen"), ('计', "ji"), ('潮', "chao"), ('与', "yu"),
    ('安', "an"), ('猎', "lie"), ('冰', "bing"), ('罪', "zui"), ('庆', "qing"), ('余', "yu"),
    ('琅', "lang"), ('琊', "ya"), ('榜', "bang"), ('延', "yan"), ('禧', "xi"), ('攻', "gong"),
    ('略', "lve"), ('传', "chuan"), ('奇', "qi"), ('志', "zhi"), ('怪', "guai"), ('谈', "tan"),
    ('诡', "gui"), ('秘', "mi"), ('密', "mi"), ('案', "an"), ('破', "po"), ('局', "ju"),
    ('重', "chong"), ('启', "qi"), ('复', "fu"), ('仇', "chou"), ('者', "zhe"), ('联', "lian"),
    ('盟', "meng"), ('终', "zhong"), ('极', "ji"), ('无', "wu"), ('限', "xian"), ('使', "shi"),
];

/// Component decompositions used by the char-split scheme.
static CHAR_SPLIT: &[(char, &str)] = &[
    ('双', "又又"), ('轨', "车九"), ('速', "束"), ('度', "广彳又"), ('与', "一"), ('激', "氵白方"),
    ('情', "忄青"), ('权', "木又"), ('力', "力"), ('的', "白勺"), ('游', "氵斿"), ('戏', "戈戈又"),
    ('三', "三"), ('体', "亻本"), ('流', "氵㐬"), ('浪', "氵良"), ('地', "土也"), ('球', "王求"),
    ('爱', "爫友"), ('死', "歹匕"), ('机', "木几"), ('器', "口口口犬"), ('人', "人"), ('独', "犭虫"),
    ('行', "彳亍"), ('月', "月"), ('侠', "亻夹"), ('风', "风"), ('云', "云"), ('雨', "雨"),
    ('雷', "雨田"), ('电', "电"), ('火', "火"), ('水', "氵"), ('木', "木"), ('金', "金"),
    ('土', "土"), ('海', "氵每"), ('贼', "贝戋"), ('王', "王"), ('神', "礻申"), ('鬼', "鬼"),
    ('龙', "龙"), ('凤', "风凡"), ('虎', "虎"), ('狼', "犭良"), ('豹', "豸勺"), ('狮', "犭师"),
    ('鹰', "广隹"), ('熊', "能灬"), ('战', "战"), ('士', "士"), ('将', "将"), ('军', "车云"),
    ('国', "囗玉"), ('家', "宀豕"), ('天', "一大"), ('下', "一卜"), ('上', "卜一"), ('中', "口丨"),
    ('大', "大"), ('小', "小"), ('高', "高"), ('低', "亻氐"), ('长', "长"), ('短', "矢豆"),
    ('好', "女子"), ('坏', "土褱"), ('新', "亲斤"), ('旧', "旧"), ('东', "东"), ('西', "西"),
    ('南', "南"), ('北', "北"), ('前', "前"), ('后', "后"), ('左', "左"), ('右', "右"),
    ('里', "里"), ('外', "外"), ('黑', "黑"), ('白', "白"), ('红', "纟工"), ('绿', "纟录"),
    ('蓝', "蓝"), ('黄', "黄"), ('紫', "此糸"), ('灰', "火"), ('粉', "米分"), ('银', "金艮"),
    ('星', "日生"), ('辰', "辰"), ('日', "日"), ('夜', "夜"), ('晨', "日辰"), ('光', "光"),
    ('明', "日月"), ('暗', "日音"), ('亮', "亮"), ('黯', "黑音"), ('心', "心"), ('灵', "灵"),
    ('魂', "云鬼"), ('魄', "白鬼"), ('意', "音心"), ('志', "士心"), ('念', "今心"), ('想', "相心"),
    ('思', "田心"), ('忆', "忄乙"), ('恋', "亦心"), ('欲', "谷欠"), ('望', "亡月王"), ('梦', "林夕"),
    ('幻', "幺丿"), ('像', "亻象"), ('影', "彡景"), ('声', "士殳"), ('音', "音"), ('乐', "乐"),
    ('歌', "哥欠"), ('舞', "舛"), ('剑', "剑"), ('刀', "刀"), ('枪', "木仓"), ('炮', "火包"),
    ('弓', "弓"), ('箭', "竹前"), ('盾', "盾"), ('甲', "甲"), ('兵', "兵"), ('客', "宀各"),
    ('匪', "匚非"), ('盗', "盗"), ('杀', "杀"), ('伤', "亻伤"), ('生', "生"), ('活', "氵舌"),
    ('命', "命"), ('运', "辶军"), ('气', "气"), ('血', "血"), ('肉', "月"), ('骨', "骨"),
    ('皮', "皮"), ('毛', "毛"), ('发', "发"), ('手', "手"), ('足', "足"), ('头', "头"),
    ('目', "目"), ('口', "口"), ('耳', "耳"), ('鼻', "鼻"), ('身', "身"), ('脑', "月脑"),
    ('肺', "月市"), ('肝', "月干"), ('肾', "月臤"), ('胃', "月胃"), ('肠', "月肠"), ('泪', "氵泪"),
    ('汗', "氵干"), ('尿', "尸水"), ('屎', "尸米"), ('屁', "尸比"), ('超', "走召"), ('感', "咸心"),
    ('迷', "辶米"), ('宫', "宀口"), ('产', "产"), ('剧', "刂居"), ('集', "隹木"), ('闻', "门耳"),
    ('女', "女"), ('港', "氵巷"), ('台', "台"),
];

static PINYIN_MAP: Lazy<HashMap<char, &'static str>> =
    Lazy::new(|| PINYIN.iter().copied().collect());

static CHAR_SPLIT_MAP: Lazy<HashMap<char, &'static str>> =
    Lazy::new(|| CHAR_SPLIT.iter().copied().collect());

/// Romanisation of `ch`, if known.
pub fn pinyin(ch: char) -> Option<&'static str> {
    PINYIN_MAP.get(&ch).copied()
}

/// Component decomposition of `ch`, if known.
pub fn split_components(ch: char) -> Option<&'static str> {
    CHAR_SPLIT_MAP.get(&ch).copied()
}
